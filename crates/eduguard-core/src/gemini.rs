//! Gemini `generateContent` REST client.
//!
//! One [`GeminiClient`] backs both model capabilities the pipeline needs:
//! structured classification ([`Classifier`]) and reply generation
//! ([`ReplyGenerator`]). Build it once at startup and share it behind an
//! `Arc`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::classifier::{classification_prompt, parse_classification, ClassificationResult, Classifier};
use crate::error::{ClassificationError, ModelError};
use crate::generator::{
    Generation, ReplyGenerator, Turn, TurnRole, REPLY_MAX_OUTPUT_TOKENS, REPLY_TEMPERATURE,
    SYSTEM_INSTRUCTION,
};

pub const DEFAULT_MODEL: &str = "gemini-1.5-pro";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const CLASSIFY_TEMPERATURE: f32 = 0.0;
const CLASSIFY_MAX_OUTPUT_TOKENS: u32 = 256;

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    /// Scheme and host of the API, without a trailing slash.
    pub base_url: String,
    pub timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_owned(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout: Duration::from_secs(50),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, ModelError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    async fn generate_content(&self, body: &GenerateContentRequest) -> Result<GenerateContentResponse, ModelError> {
        debug!(model = %self.config.model, turns = body.contents.len(), "calling generateContent");
        let resp = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateContentResponse = resp.json().await?;
        if let Some(reason) = parsed
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.clone())
        {
            return Err(ModelError::Blocked { reason });
        }
        Ok(parsed)
    }
}

#[async_trait]
impl Classifier for GeminiClient {
    async fn classify(&self, text: &str) -> Result<ClassificationResult, ClassificationError> {
        let body = GenerateContentRequest {
            contents: vec![Content::from(&Turn::user(classification_prompt(text)))],
            system_instruction: None,
            generation_config: GenerationConfig {
                temperature: CLASSIFY_TEMPERATURE,
                max_output_tokens: CLASSIFY_MAX_OUTPUT_TOKENS,
                response_mime_type: Some("application/json".to_owned()),
                response_schema: Some(classification_schema()),
            },
        };
        let resp = self.generate_content(&body).await?;
        parse_classification(&resp.text())
    }
}

#[async_trait]
impl ReplyGenerator for GeminiClient {
    async fn generate(&self, conversation: &[Turn]) -> Result<Generation, ModelError> {
        let body = GenerateContentRequest {
            contents: conversation.iter().map(Content::from).collect(),
            system_instruction: Some(SystemInstruction {
                parts: vec![Part {
                    text: SYSTEM_INSTRUCTION.to_owned(),
                }],
            }),
            generation_config: GenerationConfig {
                temperature: REPLY_TEMPERATURE,
                max_output_tokens: REPLY_MAX_OUTPUT_TOKENS,
                response_mime_type: None,
                response_schema: None,
            },
        };
        let resp = self.generate_content(&body).await?;
        Ok(Generation {
            text: resp.text().trim().to_owned(),
            model: self.config.model.clone(),
            tokens: resp.usage_metadata.and_then(|u| u.total_token_count),
        })
    }
}

fn classification_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "isEducational": { "type": "BOOLEAN" },
            "category": { "type": "STRING" }
        },
        "required": ["isEducational", "category"]
    })
}

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl From<&Turn> for Content {
    fn from(turn: &Turn) -> Self {
        let role = match turn.role {
            TurnRole::User => "user",
            TurnRole::Model => "model",
        };
        Self {
            role: Some(role.to_owned()),
            parts: vec![Part {
                text: turn.text.clone(),
            }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate; empty when there is none.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| content.parts.iter().map(|p| p.text.as_str()).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    total_token_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

// ── Tests ──────────────────────────────────────────────────────────────────────
