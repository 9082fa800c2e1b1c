//! eduguard-server – entry point.
//!
//! Startup order:
//! 1. Parse configuration from environment variables.
//! 2. Initialise structured tracing (JSON in production, pretty in dev).
//! 3. Open the SQLite database and run pending migrations.
//! 4. Build the Gemini model adapters when an API key is configured.
//! 5. Build the Axum router and start the HTTP server with graceful shutdown.

mod config;
mod error;
mod middleware;
mod routes;
mod schemas;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use eduguard_core::{GeminiClient, ModelAdapters, ModerationPipeline, SqliteStore};
use tracing::{info, warn};

use crate::config::Config;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cfg = Config::from_env();

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: EDU_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true);

    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "eduguard-server starting");

    // ── 3. Database ────────────────────────────────────────────────────────────
    let store = SqliteStore::connect(&cfg.database_url).await?;
    info!(database_url = %cfg.database_url, "database ready");

    // ── 4. Model adapters ──────────────────────────────────────────────────────
    let adapters = match cfg.gemini_config() {
        Some(gemini) => {
            let client = GeminiClient::new(gemini)?;
            info!(model = client.model(), "model adapters configured");
            ModelAdapters::from_shared(Arc::new(client))
        }
        None => {
            warn!("EDU_GENAI_KEY not set; every admitted request will be answered as unavailable");
            ModelAdapters::unconfigured()
        }
    };

    let pipeline = ModerationPipeline::new(Arc::new(store), adapters, cfg.pipeline_config());
    let state = Arc::new(AppState {
        config: Arc::new(cfg.clone()),
        pipeline: Arc::new(pipeline),
    });

    // ── 5. HTTP server with graceful shutdown ──────────────────────────────────
    let app = routes::build(Arc::clone(&state));
    let addr: SocketAddr = cfg.bind_address.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.pipeline.store().close().await;
    info!("eduguard-server stopped");
    Ok(())
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c   => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
