use chrono::{DateTime, Utc};
use strum::{AsRefStr, Display, EnumString};

/// Longest content stored per message, in characters.
pub const MAX_CONTENT_CHARS: usize = 4000;

/// Default number of messages fed back to the model as context.
pub const HISTORY_LIMIT: usize = 12;

/// Author of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum MessageRole {
    User,
    Model,
    System,
}

/// A message about to be appended to a chat.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub model: Option<String>,
    pub tokens: Option<u32>,
}

impl NewMessage {
    pub fn new(role: MessageRole, content: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at,
            model: None,
            tokens: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>, tokens: Option<u32>) -> Self {
        self.model = Some(model.into());
        self.tokens = tokens;
        self
    }

    /// Content cut to [`MAX_CONTENT_CHARS`] characters.
    pub fn stored_content(&self) -> &str {
        match self.content.char_indices().nth(MAX_CONTENT_CHARS) {
            Some((cut, _)) => &self.content[..cut],
            None => &self.content,
        }
    }
}

/// A row in the `edu_messages` table. `role` and `content` are `None` for
/// incomplete rows.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: String,
    pub role: Option<String>,
    pub content: Option<String>,
    pub model: Option<String>,
    pub tokens: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// A well-formed history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
}
