use std::sync::Arc;

use ferry_api::{
    extract::{Request, State},
    header,
    middleware::{self, Next},
    response::{IntoResponse as _, Response},
    routing::get,
    APIHandler, Json, Router, StatusCode,
};
use ferry_config::ParameterGroup as _;
use ferry_core::statistics::{DistributionStatistics, StatisticsSnapshot};
use headers::{authorization::Basic, Authorization, HeaderMapExt as _};
use serde::Serialize;
use tracing::debug;

use crate::{activator::ControlPlaneContext, parameters::RestServerParameters};

const REALM_CHALLENGE: &str = "Basic realm=\"ferry\"";

#[derive(Serialize)]
struct HealthCheckResponse {
    name: String,
    url: String,
    healthy: bool,
    code: u16,
    message: &'static str,
}

#[derive(Serialize)]
struct StatisticsResponse {
    code: u16,
    #[serde(flatten)]
    statistics: StatisticsSnapshot,
}

/// State shared by the control-plane routes.
#[derive(Clone)]
pub struct ControlPlaneState {
    name: Arc<str>,
    url: Arc<str>,
    user_name: Arc<str>,
    password: Arc<str>,
    context: ControlPlaneContext,
}

impl ControlPlaneState {
    fn statistics(&self) -> &DistributionStatistics {
        &self.context.statistics
    }

    fn is_authorized(&self, credentials: &Authorization<Basic>) -> bool {
        credentials.username() == &*self.user_name && credentials.password() == &*self.password
    }
}

/// Control-plane API: `/healthcheck` and `/statistics`, behind basic authentication.
pub struct ControlPlaneAPIHandler {
    state: ControlPlaneState,
}

impl ControlPlaneAPIHandler {
    /// Creates a new `ControlPlaneAPIHandler` authenticating against the given REST server parameters.
    pub fn new(parameters: &RestServerParameters, context: ControlPlaneContext) -> Self {
        Self {
            state: ControlPlaneState {
                name: parameters.name().into(),
                url: parameters.base_url().into(),
                user_name: parameters.user_name().into(),
                password: parameters.password().into(),
                context,
            },
        }
    }

    async fn healthcheck_handler(State(state): State<ControlPlaneState>) -> Response {
        let healthy = state.context.lifecycle.is_alive();
        let (code, message) = if healthy {
            (StatusCode::OK, "alive")
        } else {
            (StatusCode::INTERNAL_SERVER_ERROR, "not alive")
        };

        let response = HealthCheckResponse {
            name: state.name.to_string(),
            url: state.url.to_string(),
            healthy,
            code: code.as_u16(),
            message,
        };
        (code, Json(response)).into_response()
    }

    async fn statistics_handler(State(state): State<ControlPlaneState>) -> Json<StatisticsResponse> {
        Json(StatisticsResponse {
            code: StatusCode::OK.as_u16(),
            statistics: state.statistics().snapshot(),
        })
    }
}

impl APIHandler for ControlPlaneAPIHandler {
    type State = ControlPlaneState;

    fn generate_initial_state(&self) -> Self::State {
        self.state.clone()
    }

    fn generate_routes(&self) -> Router<Self::State> {
        Router::new()
            .route("/healthcheck", get(Self::healthcheck_handler))
            .route("/statistics", get(Self::statistics_handler))
            .route_layer(middleware::from_fn_with_state(self.state.clone(), require_basic_auth))
    }
}

async fn require_basic_auth(State(state): State<ControlPlaneState>, request: Request, next: Next) -> Response {
    let authorized = request
        .headers()
        .typed_get::<Authorization<Basic>>()
        .is_some_and(|credentials| state.is_authorized(&credentials));

    if authorized {
        next.run(request).await
    } else {
        debug!(path = request.uri().path(), "Rejected unauthenticated control-plane request.");
        (StatusCode::UNAUTHORIZED, [(header::WWW_AUTHENTICATE, REALM_CHALLENGE)]).into_response()
    }
}
