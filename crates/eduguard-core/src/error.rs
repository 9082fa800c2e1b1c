//! Error kinds produced while moderating a request.
//!
//! [`ModerationError`] is returned by every pipeline stage. The orchestrator
//! in [`crate::pipeline`] turns each variant into a canned, client-safe
//! response, so the `Display` text here is for logs only.

use thiserror::Error;

/// Why a request was rejected before anything was persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidInput {
    #[error("missing chat id")]
    MissingChatId,

    #[error("empty message")]
    EmptyMessage,
}

/// Failures talking to the external generative-language model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Transport-level failure (connect, timeout, body decode).
    #[error("model request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The model API answered with a non-success status.
    #[error("model API returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The model API answered 200 but refused the prompt.
    #[error("prompt blocked by model: {reason}")]
    Blocked { reason: String },
}

/// The classifier produced no usable verdict.
#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("empty classification response")]
    Empty,

    #[error("failed to parse classification response: {reason}")]
    Malformed { reason: String },

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// All outcomes that stop the pipeline short of a generated reply.
#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("authentication required")]
    AuthRequired,

    #[error("invalid input: {0}")]
    InvalidInput(InvalidInput),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("message matched the deny list")]
    DenylistRefusal,

    #[error("classified as non-educational (category: {category})")]
    NotEducational { category: String },

    #[error("category failed the keyword cross-check (category: {category})")]
    CategoryRejected { category: String },

    /// Model adapters are not configured.
    #[error("model service unavailable")]
    ServiceUnavailable,

    #[error("classification failed: {0}")]
    Classification(#[from] ClassificationError),

    #[error("generation failed: {0}")]
    Generation(#[from] ModelError),

    #[error("model returned an empty reply")]
    GenerationEmpty,

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("moderation did not finish within {0:?}")]
    DeadlineExceeded(std::time::Duration),

    #[error("unhandled error: {0}")]
    Unhandled(String),
}

impl From<InvalidInput> for ModerationError {
    fn from(e: InvalidInput) -> Self {
        ModerationError::InvalidInput(e)
    }
}
