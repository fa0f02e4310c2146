// Handlers: version, status, latest flow, enable/disable

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use super::AppState;
use crate::models::{CollectionState, PortCounter, RateSample};
use crate::pipeline::CommandRunner;

/// Package name and version, baked in from Cargo.toml.
const NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    state: CollectionState,
    interval_secs: u64,
    counters: Vec<PortCounter>,
    latest: Option<RateSample>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToggleResponse {
    state: CollectionState,
    changed: bool,
}

/// GET /version — returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /api/status — collection state, counter table and the latest published sample.
pub(super) async fn status_handler<R: CommandRunner + 'static>(
    State(state): State<AppState<R>>,
) -> impl IntoResponse {
    let counters = state.engine.snapshot().await;
    let latest = state.latest.read().await.clone();
    Json(StatusResponse {
        state: state.engine.state(),
        interval_secs: state.engine.interval().as_secs(),
        counters,
        latest,
    })
}

/// GET /api/flow — latest sample, 404 until the first one is published.
pub(super) async fn flow_handler<R: CommandRunner + 'static>(
    State(state): State<AppState<R>>,
) -> impl IntoResponse {
    match state.latest.read().await.clone() {
        Some(sample) => Json(sample).into_response(),
        None => (StatusCode::NOT_FOUND, "no flow sample yet").into_response(),
    }
}

/// POST /api/collect/enable — flips the directive open and enables right away.
pub(super) async fn enable_handler<R: CommandRunner + 'static>(
    State(state): State<AppState<R>>,
) -> impl IntoResponse {
    state.directive.set_open(true).await;
    let changed = state.engine.enable().await;
    tracing::info!(changed, "collection enable requested");
    Json(ToggleResponse {
        state: state.engine.state(),
        changed,
    })
}

/// POST /api/collect/disable — flips the directive closed and disables right away.
pub(super) async fn disable_handler<R: CommandRunner + 'static>(
    State(state): State<AppState<R>>,
) -> impl IntoResponse {
    state.directive.set_open(false).await;
    let changed = state.engine.disable().await;
    tracing::info!(changed, "collection disable requested");
    Json(ToggleResponse {
        state: state.engine.state(),
        changed,
    })
}
