//! Unified server error type for the non-callable routes.
//!
//! The callable reply endpoint never fails with a `ServerError` once its
//! envelope is parsed: the pipeline turns every outcome into a canned reply.
//! Internal errors are logged with full detail and answered with a generic
//! message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// No identity could be resolved for the caller.
    #[error("authentication required")]
    Unauthorized,

    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Propagated from the SQLite store.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = match &self {
            ServerError::Unauthorized => (StatusCode::UNAUTHORIZED, "authentication required".to_owned()),
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ServerError::Database(e) => {
                error!(error = %e, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
