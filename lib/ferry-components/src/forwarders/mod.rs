//! Forwarder implementations.

use ferry_core::forwarding::{ArtifactForwarder, ForwarderRegistry};

mod file;
pub use self::file::FileForwarder;

mod log;
pub use self::log::LogForwarder;

/// Registers every built-in forwarder: `log` and `file`.
pub fn register_builtin_forwarders(registry: &mut ForwarderRegistry) {
    registry
        .register("log", || Ok(Box::new(LogForwarder::default()) as Box<dyn ArtifactForwarder>))
        .register("file", || Ok(Box::new(FileForwarder::default()) as Box<dyn ArtifactForwarder>));
}
