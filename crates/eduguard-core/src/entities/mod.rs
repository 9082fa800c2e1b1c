//! Persistence layer.
//!
//! [`ChatStore`] and [`RateLimitStore`] define what the moderation pipeline
//! needs from storage. The default implementation is [`SqliteStore`]. To swap
//! to another database, implement both traits for the new type and hand it
//! to [`crate::pipeline::ModerationPipeline`].
//!
//! All trait methods use `impl Future` in their signatures so no extra
//! `async-trait` crate is required on this side.

pub mod chat;
pub mod dao;
pub mod rate_limit;

pub use dao::{
    ChatKey, ChatMessage, ChatRecord, HistoryMessage, MessageRole, NewMessage, DEFAULT_CHAT_TITLE,
    HISTORY_LIMIT, MAX_CONTENT_CHARS,
};

pub use chat::ChatStore;
pub use rate_limit::RateLimitStore;

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

/// SQLite-backed store for chats, messages and rate-limit windows.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the SQLite database at `url` and run pending migrations.
    ///
    /// `url` should be a sqlx-compatible SQLite URL, e.g. `"sqlite://edu.db"`
    /// or `"sqlite::memory:"` for tests. An in-memory database is pinned to a
    /// single long-lived connection so every query sees the same data.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new().connect_with(options).await?
        };
        // Path is resolved relative to CARGO_MANIFEST_DIR at compile time.
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Round-trip a trivial query to check the database is reachable.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close every pooled connection. Later calls fail with `PoolClosed`.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

/// Fixed-width RFC 3339 so text ordering matches time ordering.
fn to_db_time(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn from_db_time(raw: &str, column: &'static str) -> Result<DateTime<Utc>, sqlx::Error> {
    raw.parse().map_err(|e: chrono::ParseError| {
        tracing::warn!(raw = %raw, column, error = %e, "unparseable stored timestamp");
        sqlx::Error::Decode(Box::new(e))
    })
}
