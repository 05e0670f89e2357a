//! Artifact forwarders.
use std::sync::Arc;

use ferry_error::GenericError;
use serde::de::DeserializeOwned;
use snafu::Snafu;

use crate::{
    model::Artifact, parameters::ArtifactForwarderConfigurationParameterGroup, plugin::PluginRegistry,
};

/// A forwarding error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ForwardingError {
    /// The forwarder's configuration was missing or invalid.
    #[snafu(display("Invalid forwarder configuration: {}", reason))]
    InvalidConfiguration {
        /// Description of the problem.
        reason: String,
    },

    /// The artifacts could not be delivered.
    #[snafu(display("Failed to deliver {} artifact(s).", artifacts))]
    Delivery {
        /// Number of artifacts in the failed delivery.
        artifacts: usize,

        /// Error source.
        source: GenericError,
    },
}

/// Delivers artifacts to an external system.
///
/// Forwarders are configured once, and then shared with whichever thread a reception plugin delivers notifications
/// from, so they must be `Send` and `Sync`.
pub trait ArtifactForwarder: Send + Sync {
    /// Configures the forwarder.
    ///
    /// # Errors
    ///
    /// If the forwarder's configuration is missing or invalid, or its resources cannot be set up, an error is returned.
    fn configure(&mut self, context: &ForwarderContext<'_>) -> Result<(), ForwardingError>;

    /// Forwards the given artifacts.
    ///
    /// # Errors
    ///
    /// If the artifacts could not be delivered, an error is returned.
    fn forward(&self, artifacts: &[Artifact]) -> Result<(), ForwardingError>;
}

/// Registry of forwarder plugins.
pub type ForwarderRegistry = PluginRegistry<dyn ArtifactForwarder>;

/// Context passed to a forwarder when it is configured.
pub struct ForwarderContext<'a> {
    forwarder_name: &'a str,
    configuration_name: Option<&'a str>,
    configuration: Option<Arc<ArtifactForwarderConfigurationParameterGroup>>,
}

impl<'a> ForwarderContext<'a> {
    /// Creates a new `ForwarderContext`.
    pub fn new(
        forwarder_name: &'a str, configuration_name: Option<&'a str>,
        configuration: Option<Arc<ArtifactForwarderConfigurationParameterGroup>>,
    ) -> Self {
        Self {
            forwarder_name,
            configuration_name,
            configuration,
        }
    }

    /// Name of the forwarder being configured.
    pub fn forwarder_name(&self) -> &str {
        self.forwarder_name
    }

    /// Name of the forwarder's configuration group, if it has one.
    pub fn configuration_name(&self) -> Option<&str> {
        self.configuration_name
    }

    /// The forwarder's configuration group, if it has one.
    pub fn configuration(&self) -> Option<&ArtifactForwarderConfigurationParameterGroup> {
        self.configuration.as_deref()
    }

    /// Deserializes the forwarder's plugin parameters as `T`.
    ///
    /// A forwarder without a configuration group is given an empty mapping.
    ///
    /// # Errors
    ///
    /// If the parameters cannot be deserialized as `T`, an error is returned.
    pub fn typed_configuration<T: DeserializeOwned>(&self) -> Result<T, ForwardingError> {
        let parameters = match &self.configuration {
            Some(configuration) => configuration.typed_parameters(),
            None => serde_json::from_value(serde_json::Value::Object(serde_json::Map::new())),
        };
        parameters.map_err(|e| ForwardingError::InvalidConfiguration {
            reason: format!(
                "forwarder '{}' configuration '{}': {}",
                self.forwarder_name,
                self.configuration_name.unwrap_or("<none>"),
                e
            ),
        })
    }
}
