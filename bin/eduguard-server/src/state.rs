//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use eduguard_core::{ModerationPipeline, SqliteStore};

use crate::config::Config;

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Moderation pipeline; also owns the chat store.
    pub pipeline: Arc<ModerationPipeline<SqliteStore>>,
}
