use crate::state::AppState;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

pub fn cors_layer(state: &Arc<AppState>) -> CorsLayer {
    let origins: Vec<axum::http::HeaderValue> = state
        .config
        .cors_allowed_origins
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    let cors = CorsLayer::new().allow_headers(Any).allow_methods(Any);
    if origins.is_empty() {
        // Wildcard; set EDU_CORS_ORIGINS in production.
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    }
}
