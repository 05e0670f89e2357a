use metrics::{counter, Counter};

/// Dispatch counters for a single reception handler.
#[derive(Clone)]
pub(super) struct DispatchTelemetry {
    pub notifications_received: Counter,
    pub decoding_failures: Counter,
    pub forwards_succeeded: Counter,
    pub forwards_failed: Counter,
}

impl DispatchTelemetry {
    pub fn new(handler_name: &str) -> Self {
        Self {
            notifications_received: counter!("ferry_notifications_received_total", "reception_handler" => handler_name.to_string()),
            decoding_failures: counter!("ferry_notification_decoding_failures_total", "reception_handler" => handler_name.to_string()),
            forwards_succeeded: counter!("ferry_forwards_succeeded_total", "reception_handler" => handler_name.to_string()),
            forwards_failed: counter!("ferry_forwards_failed_total", "reception_handler" => handler_name.to_string()),
        }
    }
}
