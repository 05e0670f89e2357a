//! Built-in plugins.
//!
//! This crate contains the reception plugins, forwarders, and decoders shipped with Ferry.
#![deny(missing_docs)]

use ferry_core::{forwarding::ForwarderRegistry, reception::ReceptionRegistry};

pub mod decoders;
pub mod forwarders;
pub mod receptions;

/// Creates a forwarder registry containing every built-in forwarder.
pub fn builtin_forwarders() -> ForwarderRegistry {
    let mut registry = ForwarderRegistry::new("forwarder");
    forwarders::register_builtin_forwarders(&mut registry);
    registry
}

/// Creates a reception registry containing every built-in reception plugin.
pub fn builtin_receptions() -> ReceptionRegistry {
    let mut registry = ReceptionRegistry::new("reception");
    receptions::register_builtin_receptions(&mut registry);
    registry
}

#[cfg(test)]
pub(crate) mod test_util;
