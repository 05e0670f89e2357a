//! Application bootstrap primitives.
#![deny(missing_docs)]

#[cfg(feature = "api")]
pub mod api;

#[cfg(feature = "logging")]
pub mod logging;
