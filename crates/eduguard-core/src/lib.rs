//! eduguard-core – moderation pipeline for an educational chat assistant.
//!
//! The crate is transport-agnostic: the HTTP binary resolves the caller's
//! identity and hands each request to [`ModerationPipeline::handle`].
//!
//! Module map:
//! - [`keywords`]: deny / allow lists
//! - [`rate_limit`]: per-user window policy
//! - [`classifier`] and [`generator`]: model capability traits
//! - [`gemini`]: REST client implementing both capabilities
//! - [`entities`]: SQLite-backed chat log and rate-limit store
//! - [`pipeline`]: the orchestrator

pub mod classifier;
pub mod entities;
pub mod error;
pub mod gemini;
pub mod generator;
pub mod keywords;
pub mod pipeline;
pub mod rate_limit;

pub use classifier::{ClassificationResult, Classifier};
pub use entities::{ChatKey, ChatMessage, ChatStore, RateLimitStore, SqliteStore};
pub use error::{ClassificationError, InvalidInput, ModelError, ModerationError};
pub use gemini::{GeminiClient, GeminiConfig};
pub use generator::{Generation, ReplyGenerator, Turn};
pub use keywords::KeywordFilter;
pub use pipeline::{ModelAdapters, ModerationPipeline, PipelineConfig, ReplyRequest, ReplyResponse};
pub use rate_limit::RateLimitPolicy;
