// HTTP control surface: status, latest sample, enable/disable collection

mod http;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::engine::FlowEngine;
use crate::pipeline::CommandRunner;
use crate::remote_config::SharedDirective;
use crate::worker::LatestSample;

pub(crate) struct AppState<R> {
    pub(crate) engine: Arc<FlowEngine<R>>,
    pub(crate) directive: SharedDirective,
    pub(crate) latest: LatestSample,
}

// Manual impl: derive would require R: Clone.
impl<R> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            directive: self.directive.clone(),
            latest: self.latest.clone(),
        }
    }
}

pub fn app<R: CommandRunner + 'static>(
    engine: Arc<FlowEngine<R>>,
    directive: SharedDirective,
    latest: LatestSample,
) -> Router {
    let state = AppState {
        engine,
        directive,
        latest,
    };
    Router::new()
        .route("/", get(|| async { "netflow: per-port flow collector" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/status", get(http::status_handler::<R>)) // GET /api/status
        .route("/api/flow", get(http::flow_handler::<R>)) // GET /api/flow
        .route("/api/collect/enable", post(http::enable_handler::<R>)) // POST /api/collect/enable
        .route("/api/collect/disable", post(http::disable_handler::<R>)) // POST /api/collect/disable
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
