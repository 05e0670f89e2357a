//! Core primitives for composing reception handlers and artifact forwarders.
#![deny(missing_docs)]

pub mod decoding;
pub mod forwarding;
pub mod model;
pub mod parameters;
pub mod plugin;
pub mod reception;
pub mod statistics;

#[cfg(test)]
pub(crate) mod test_util;
