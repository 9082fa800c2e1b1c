//! Request moderation pipeline.
//!
//! [`ModerationPipeline::handle`] runs one callable request through the
//! layered gates (auth, input, rate limit, deny list, service availability,
//! classifier, keyword cross-check) and, when everything passes, generates
//! and stores a reply. Past input validation every outcome is written to the
//! chat log, refusals included, and the caller always gets a canned,
//! human-readable text instead of an internal error.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::classifier::{Classifier, UNKNOWN_CATEGORY};
use crate::entities::{ChatKey, ChatStore, MessageRole, NewMessage, RateLimitStore, HISTORY_LIMIT};
use crate::error::{InvalidInput, ModerationError};
use crate::generator::{build_conversation, Generation, ReplyGenerator};
use crate::keywords::KeywordFilter;
use crate::rate_limit::RateLimitPolicy;

pub const AUTH_REQUIRED_MESSAGE: &str = "Please sign in to use the educational assistant.";
pub const MISSING_CHAT_MESSAGE: &str = "Missing chat reference. Please reopen the assistant.";
pub const EMPTY_MESSAGE_MESSAGE: &str = "Please enter a question before sending.";
pub const RATE_LIMIT_MESSAGE: &str = "You're sending messages too quickly. Please wait a few minutes.";
pub const REFUSAL_MESSAGE: &str = "Sorry, I can only help with educational topics. Try questions about \
math, science, history, languages, programming, exam prep, study skills, etc.";
pub const UNAVAILABLE_MESSAGE: &str =
    "Educational assistant is temporarily unavailable. Please try again soon.";
pub const GENERATION_FALLBACK_MESSAGE: &str =
    "Educational assistant is unavailable right now. Please try again later.";

// ── Request / response ────────────────────────────────────────────────────────

/// Payload of the callable request. Fields that are missing or not strings
/// deserialize as empty and fail validation. Build it from untrusted JSON with
/// [`ReplyRequest::from_payload`].
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRequest {
    #[serde(default, deserialize_with = "lenient_string")]
    pub chat_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub message: String,
}

impl ReplyRequest {
    pub fn new(chat_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            message: message.into(),
        }
    }

    /// Read the request from a raw callable payload. Anything but a JSON
    /// object yields an empty request.
    pub fn from_payload(payload: Value) -> Self {
        match payload {
            Value::Object(_) => serde_json::from_value(payload).unwrap_or_default(),
            _ => Self::default(),
        }
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        _ => String::new(),
    })
}

/// Result returned to the client. Absent fields are omitted on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReplyResponse {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refused: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persisted: Option<bool>,
}

impl ReplyResponse {
    fn refusal(text: &str, persisted: bool) -> Self {
        Self {
            text: text.to_owned(),
            refused: Some(true),
            persisted: Some(persisted),
            ..Self::default()
        }
    }

    fn reply(generation: Generation) -> Self {
        Self {
            text: generation.text,
            refused: Some(false),
            tokens: generation.tokens,
            model: Some(generation.model),
            persisted: Some(true),
            ..Self::default()
        }
    }

    pub fn is_refused(&self) -> bool {
        self.refused == Some(true)
    }

    pub fn is_throttled(&self) -> bool {
        self.throttled == Some(true)
    }
}

// ── Collaborators ─────────────────────────────────────────────────────────────

/// Model capabilities. Either may be absent when no API key is configured;
/// the pipeline then answers with [`UNAVAILABLE_MESSAGE`].
#[derive(Clone, Default)]
pub struct ModelAdapters {
    classifier: Option<Arc<dyn Classifier>>,
    generator: Option<Arc<dyn ReplyGenerator>>,
}

impl ModelAdapters {
    pub fn new(classifier: Arc<dyn Classifier>, generator: Arc<dyn ReplyGenerator>) -> Self {
        Self {
            classifier: Some(classifier),
            generator: Some(generator),
        }
    }

    pub fn unconfigured() -> Self {
        Self::default()
    }

    /// Share one client that implements both capabilities.
    pub fn from_shared<M>(model: Arc<M>) -> Self
    where
        M: Classifier + ReplyGenerator + 'static,
    {
        Self::new(model.clone(), model)
    }

    pub fn is_configured(&self) -> bool {
        self.classifier.is_some() && self.generator.is_some()
    }

    fn require(&self) -> Result<(&dyn Classifier, &dyn ReplyGenerator), ModerationError> {
        match (&self.classifier, &self.generator) {
            (Some(c), Some(g)) => Ok((c.as_ref(), g.as_ref())),
            _ => Err(ModerationError::ServiceUnavailable),
        }
    }
}

impl std::fmt::Debug for ModelAdapters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelAdapters")
            .field("classifier", &self.classifier.is_some())
            .field("generator", &self.generator.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub rate_limit: RateLimitPolicy,
    /// Messages loaded as context for generation.
    pub history_limit: usize,
    /// Budget for everything past input validation. Must stay below any
    /// transport deadline so the unavailability notice can still be stored.
    pub deadline: Duration,
}

/// Default run budget, under the server's 60 s request timeout.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(55);

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitPolicy::default(),
            history_limit: HISTORY_LIMIT,
            deadline: DEFAULT_DEADLINE,
        }
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// A request that passed auth and input validation.
#[derive(Debug)]
struct Admitted {
    key: ChatKey,
    message: String,
}

#[derive(Debug)]
pub struct ModerationPipeline<S> {
    store: Arc<S>,
    adapters: ModelAdapters,
    keywords: KeywordFilter,
    config: PipelineConfig,
}

impl<S> ModerationPipeline<S>
where
    S: ChatStore + RateLimitStore,
{
    pub fn new(store: Arc<S>, adapters: ModelAdapters, config: PipelineConfig) -> Self {
        Self {
            store,
            adapters,
            keywords: KeywordFilter::default(),
            config,
        }
    }

    pub fn with_keywords(mut self, keywords: KeywordFilter) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn adapters(&self) -> &ModelAdapters {
        &self.adapters
    }

    /// Run one request to completion. Never fails: every error becomes a
    /// canned response.
    pub async fn handle(&self, identity: Option<&str>, request: ReplyRequest) -> ReplyResponse {
        let admitted = match admit(identity, &request) {
            Ok(admitted) => admitted,
            Err(ModerationError::AuthRequired) => {
                return ReplyResponse::refusal(AUTH_REQUIRED_MESSAGE, false);
            }
            Err(ModerationError::InvalidInput(InvalidInput::MissingChatId)) => {
                return ReplyResponse::refusal(MISSING_CHAT_MESSAGE, false);
            }
            Err(ModerationError::InvalidInput(InvalidInput::EmptyMessage)) => {
                return ReplyResponse::refusal(EMPTY_MESSAGE_MESSAGE, false);
            }
            Err(other) => return self.catch_all(None, other).await,
        };

        let now = Utc::now();
        let run = AssertUnwindSafe(self.moderate(&admitted, now)).catch_unwind();
        let outcome = match tokio::time::timeout(self.config.deadline, run).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_panic)) => Err(ModerationError::Unhandled("moderation task panicked".to_owned())),
            Err(_elapsed) => Err(ModerationError::DeadlineExceeded(self.config.deadline)),
        };

        match outcome {
            Ok(generation) => ReplyResponse::reply(generation),
            Err(err) => self.conclude(&admitted, err).await,
        }
    }

    /// Steps 3 to 13: every gate past validation, in order.
    async fn moderate(&self, req: &Admitted, now: DateTime<Utc>) -> Result<Generation, ModerationError> {
        self.store.ensure_chat(&req.key, now).await?;

        let allowed = self
            .store
            .try_acquire(&req.key.user_id, now, &self.config.rate_limit)
            .await?;
        let user_message = NewMessage::new(MessageRole::User, req.message.as_str(), now);
        let stored_message = user_message.stored_content().to_owned();
        self.store.append_message(&req.key, user_message).await?;
        if !allowed {
            return Err(ModerationError::RateLimited);
        }

        if self.keywords.is_denied(&req.message) {
            return Err(ModerationError::DenylistRefusal);
        }

        let (classifier, generator) = self.adapters.require()?;

        let verdict = classifier.classify(&req.message).await?;
        if !verdict.is_educational {
            return Err(ModerationError::NotEducational {
                category: verdict.category,
            });
        }

        let category = if verdict.category.is_empty() {
            UNKNOWN_CATEGORY.to_owned()
        } else {
            verdict.category.to_lowercase()
        };
        if self.keywords.is_denied(&category)
            || (!self.keywords.is_allowed(&category) && !self.keywords.is_allowed(&req.message))
        {
            return Err(ModerationError::CategoryRejected { category });
        }

        let mut history = self
            .store
            .load_recent_history(&req.key, self.config.history_limit)
            .await?;
        // The log already ends with this request's message; it is re-added
        // as the final turn below.
        if history
            .last()
            .is_some_and(|m| m.role == MessageRole::User.as_ref() && m.content == stored_message)
        {
            history.pop();
        }
        let conversation = build_conversation(&history, &req.message);

        let generation = generator.generate(&conversation).await?;
        if generation.text.trim().is_empty() {
            return Err(ModerationError::GenerationEmpty);
        }

        self.store
            .append_message(
                &req.key,
                NewMessage::new(MessageRole::Model, generation.text.as_str(), Utc::now())
                    .with_model(generation.model.as_str(), generation.tokens),
            )
            .await?;
        info!(
            user_id = %req.key.user_id,
            chat_id = %req.key.chat_id,
            model = %generation.model,
            tokens = ?generation.tokens,
            "reply generated"
        );
        Ok(generation)
    }

    /// Map a pipeline error to its canned reply and store that reply.
    async fn conclude(&self, req: &Admitted, err: ModerationError) -> ReplyResponse {
        let user_id = req.key.user_id.as_str();
        let chat_id = req.key.chat_id.as_str();
        let (text, throttled) = match &err {
            ModerationError::RateLimited => {
                warn!(user_id, chat_id, "request throttled");
                (RATE_LIMIT_MESSAGE, true)
            }
            ModerationError::DenylistRefusal => {
                info!(user_id, chat_id, "refused by deny list");
                (REFUSAL_MESSAGE, false)
            }
            ModerationError::NotEducational { category } => {
                info!(user_id, chat_id, category = %category, "refused by classification");
                (REFUSAL_MESSAGE, false)
            }
            ModerationError::CategoryRejected { category } => {
                info!(user_id, chat_id, category = %category, "refused by keyword cross-check");
                (REFUSAL_MESSAGE, false)
            }
            ModerationError::ServiceUnavailable => {
                error!(user_id, chat_id, "model adapters not configured");
                (UNAVAILABLE_MESSAGE, false)
            }
            ModerationError::GenerationEmpty => {
                warn!(user_id, chat_id, "model returned an empty reply");
                (GENERATION_FALLBACK_MESSAGE, false)
            }
            ModerationError::AuthRequired
            | ModerationError::InvalidInput(_)
            | ModerationError::Classification(_)
            | ModerationError::Generation(_)
            | ModerationError::Store(_)
            | ModerationError::DeadlineExceeded(_)
            | ModerationError::Unhandled(_) => return self.catch_all(Some(&req.key), err).await,
        };

        match self.append_reply(&req.key, text).await {
            Ok(()) => ReplyResponse {
                throttled: throttled.then_some(true),
                ..ReplyResponse::refusal(text, true)
            },
            Err(e) => self.catch_all(Some(&req.key), e.into()).await,
        }
    }

    /// Terminal handler: log, try once to store the unavailability notice and
    /// answer with it whatever happens.
    async fn catch_all(&self, key: Option<&ChatKey>, err: ModerationError) -> ReplyResponse {
        let user_id = key.map(|k| k.user_id.as_str()).unwrap_or_default();
        let chat_id = key.map(|k| k.chat_id.as_str()).unwrap_or_default();
        error!(user_id, chat_id, error = %err, "moderation request failed");

        let Some(key) = key else {
            return ReplyResponse::refusal(UNAVAILABLE_MESSAGE, false);
        };
        let persisted = match self.append_reply(key, UNAVAILABLE_MESSAGE).await {
            Ok(()) => true,
            Err(e) => {
                error!(user_id, chat_id, error = %e, "failed to persist unavailability notice");
                false
            }
        };
        ReplyResponse::refusal(UNAVAILABLE_MESSAGE, persisted)
    }

    async fn append_reply(&self, key: &ChatKey, text: &str) -> Result<(), sqlx::Error> {
        self.store
            .append_message(key, NewMessage::new(MessageRole::Model, text, Utc::now()))
            .await
            .map(|_| ())
    }
}

/// Steps 1 and 2: nothing is persisted for requests rejected here.
fn admit(identity: Option<&str>, request: &ReplyRequest) -> Result<Admitted, ModerationError> {
    let user_id = identity
        .map(str::trim)
        .filter(|uid| !uid.is_empty())
        .ok_or(ModerationError::AuthRequired)?;

    let chat_id = request.chat_id.trim();
    if chat_id.is_empty() {
        return Err(InvalidInput::MissingChatId.into());
    }
    let message = request.message.trim();
    if message.is_empty() {
        return Err(InvalidInput::EmptyMessage.into());
    }

    Ok(Admitted {
        key: ChatKey::new(user_id, chat_id),
        message: message.to_owned(),
    })
}

// ── Tests ──────────────────────────────────────────────────────────────────────
