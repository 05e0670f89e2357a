//! Building blocks for the control-plane HTTP API.
#![deny(missing_docs)]

pub use axum::{body, middleware, response, routing, Json, Router};
pub use http::{header, HeaderMap, HeaderValue, StatusCode};

/// Request extractors.
pub mod extract {
    pub use axum::extract::*;
}

/// An API handler.
///
/// API handlers define the initial state and routes for a portion of an API. Handlers are merged into a single router
/// by the API server.
pub trait APIHandler {
    /// State shared by the handler's routes.
    type State: Clone + Send + Sync + 'static;

    /// Generates the state the handler's routes are served with.
    fn generate_initial_state(&self) -> Self::State;

    /// Generates the handler's routes.
    fn generate_routes(&self) -> Router<Self::State>;
}
