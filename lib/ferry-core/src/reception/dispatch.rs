use std::sync::Arc;

use ferry_error::render_error_chain;
use serde::Serialize;
use tracing::{debug, error, warn};

use super::{telemetry::DispatchTelemetry, PluginHandler};
use crate::{
    decoding::{DecodingError, NotificationDecoder},
    model::ArtifactNotification,
    statistics::DistributionStatistics,
};

/// Outcome of dispatching one notification.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct DispatchReport {
    /// Forwarders that accepted the artifacts, in delivery order.
    pub delivered: Vec<String>,

    /// Forwarders that failed to deliver the artifacts, in delivery order.
    pub failed: Vec<String>,
}

impl DispatchReport {
    /// Returns `true` if no forwarder failed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Delivers decoded notifications to every forwarder of a reception handler.
///
/// A dispatcher is shared between a reception handler and its reception plugin; cloning is cheap. Dispatch runs
/// synchronously on the calling thread.
#[derive(Clone)]
pub struct Dispatcher {
    handler_name: Arc<str>,
    plugin_handler: Arc<PluginHandler>,
    statistics: DistributionStatistics,
    telemetry: DispatchTelemetry,
}

impl Dispatcher {
    /// Creates a new `Dispatcher` for the given reception handler.
    pub fn new(handler_name: &str, plugin_handler: Arc<PluginHandler>, statistics: DistributionStatistics) -> Self {
        Self {
            handler_name: Arc::from(handler_name),
            plugin_handler,
            statistics,
            telemetry: DispatchTelemetry::new(handler_name),
        }
    }

    /// Name of the reception handler this dispatcher belongs to.
    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    /// The plugin handler notifications are dispatched to.
    pub fn plugin_handler(&self) -> &PluginHandler {
        &self.plugin_handler
    }

    /// Forwards the notification's artifacts to every forwarder, in order.
    ///
    /// A forwarder failing does not stop delivery to the forwarders after it: the failure is logged and counted, and
    /// reported back in the [`DispatchReport`]. This call never fails.
    pub fn input_received(&self, notification: &ArtifactNotification) -> DispatchReport {
        self.statistics.notification_received();
        self.telemetry.notifications_received.increment(1);

        let mut report = DispatchReport::default();
        for (forwarder_name, forwarder) in self.plugin_handler.forwarders() {
            match forwarder.forward(&notification.artifacts) {
                Ok(()) => {
                    debug!(
                        reception_handler = %self.handler_name,
                        forwarder = forwarder_name,
                        distribution_id = %notification.distribution_id,
                        artifacts = notification.artifacts.len(),
                        "Forwarded artifacts."
                    );
                    self.statistics.forward_succeeded();
                    self.telemetry.forwards_succeeded.increment(1);
                    report.delivered.push(forwarder_name.to_string());
                }
                Err(e) => {
                    error!(
                        reception_handler = %self.handler_name,
                        forwarder = forwarder_name,
                        distribution_id = %notification.distribution_id,
                        error = %render_error_chain(&e),
                        "Failed to forward artifacts."
                    );
                    self.statistics.forward_failed();
                    self.telemetry.forwards_failed.increment(1);
                    report.failed.push(forwarder_name.to_string());
                }
            }
        }
        report
    }

    /// Decodes a raw notification and dispatches it.
    ///
    /// # Errors
    ///
    /// If the notification cannot be decoded, the error is returned and no forwarder is invoked.
    pub fn receive(&self, decoder: &dyn NotificationDecoder, raw: &[u8]) -> Result<DispatchReport, DecodingError> {
        match decoder.decode(raw) {
            Ok(notification) => Ok(self.input_received(&notification)),
            Err(e) => {
                warn!(reception_handler = %self.handler_name, error = %e, "Failed to decode notification.");
                self.statistics.decoding_failed();
                self.telemetry.decoding_failures.increment(1);
                Err(e)
            }
        }
    }
}
