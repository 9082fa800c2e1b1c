use chrono::{DateTime, Utc};

/// Title given to chats created by the pipeline.
pub const DEFAULT_CHAT_TITLE: &str = "Educational Assistant";

/// Address of one chat inside a user's namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatKey {
    pub user_id: String,
    pub chat_id: String,
}

impl ChatKey {
    pub fn new(user_id: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            chat_id: chat_id.into(),
        }
    }
}

/// A row in the `edu_chats` table.
#[derive(Debug, Clone)]
pub struct ChatRecord {
    pub key: ChatKey,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
}
