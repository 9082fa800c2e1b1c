//! Readiness of the assistant's dependencies.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tracing::warn;
use utoipa::{OpenApi, ToSchema};

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(get_health), components(schemas(HealthReport)))]
pub struct HealthApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(get_health))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthReport {
    /// `"ok"` when the chat store answers, `"degraded"` otherwise.
    pub status: &'static str,
    pub version: &'static str,
    /// `"ok"` or `"unreachable"`.
    pub database: &'static str,
    /// Without model adapters every admitted request gets the unavailability notice.
    pub model_configured: bool,
}

/// Report store reachability and model configuration.
///
/// Answers 503 while the store is unreachable; a missing model key alone
/// does not fail the check since refusals are still stored and returned.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Store reachable", body = HealthReport),
        (status = 503, description = "Store unreachable", body = HealthReport)
    )
)]
pub async fn get_health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthReport>) {
    let database_ok = match state.pipeline.store().ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "health check: store unreachable");
            false
        }
    };
    let report = HealthReport {
        status: if database_ok { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        database: if database_ok { "ok" } else { "unreachable" },
        model_configured: state.pipeline.adapters().is_configured(),
    };
    let code = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report))
}

// ── Tests ──────────────────────────────────────────────────────────────────────
