use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::entities::dao::{ChatKey, ChatMessage, ChatRecord, HistoryMessage, NewMessage, DEFAULT_CHAT_TITLE};
use crate::entities::{from_db_time, to_db_time, SqliteStore};

pub trait ChatStore: Send + Sync + 'static {
    /// Create the chat if absent; otherwise bump `last_message_at` and fill in
    /// a missing title. Never touches `created_at` or an existing title.
    fn ensure_chat(
        &self,
        key: &ChatKey,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn get_chat(
        &self,
        key: &ChatKey,
    ) -> impl Future<Output = Result<Option<ChatRecord>, sqlx::Error>> + Send;

    /// Append a message (content truncated) and bump the chat's
    /// `last_message_at`. Returns the new message id.
    fn append_message(
        &self,
        key: &ChatKey,
        msg: NewMessage,
    ) -> impl Future<Output = Result<String, sqlx::Error>> + Send;

    /// The latest `limit` messages, oldest first, without incomplete rows.
    fn load_recent_history(
        &self,
        key: &ChatKey,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<HistoryMessage>, sqlx::Error>> + Send;

    fn list_messages(
        &self,
        key: &ChatKey,
    ) -> impl Future<Output = Result<Vec<ChatMessage>, sqlx::Error>> + Send;
}

impl ChatStore for SqliteStore {
    async fn ensure_chat(&self, key: &ChatKey, now: DateTime<Utc>) -> Result<(), sqlx::Error> {
        let now = to_db_time(now);
        sqlx::query(
            "INSERT INTO edu_chats (user_id, chat_id, title, created_at, last_message_at) \
             VALUES (?1, ?2, ?3, ?4, ?4) \
             ON CONFLICT(user_id, chat_id) DO UPDATE \
             SET last_message_at = excluded.last_message_at, \
                 title = COALESCE(NULLIF(edu_chats.title, ''), excluded.title)",
        )
        .bind(&key.user_id)
        .bind(&key.chat_id)
        .bind(DEFAULT_CHAT_TITLE)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_chat(&self, key: &ChatKey) -> Result<Option<ChatRecord>, sqlx::Error> {
        let row: Option<(Option<String>, String, String)> = sqlx::query_as(
            "SELECT title, created_at, last_message_at \
             FROM edu_chats WHERE user_id = ?1 AND chat_id = ?2",
        )
        .bind(&key.user_id)
        .bind(&key.chat_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|(title, created_at, last_message_at)| -> Result<ChatRecord, sqlx::Error> {
            Ok(ChatRecord {
                key: key.clone(),
                title,
                created_at: from_db_time(&created_at, "created_at")?,
                last_message_at: from_db_time(&last_message_at, "last_message_at")?,
            })
        })
        .transpose()
    }

    async fn append_message(&self, key: &ChatKey, msg: NewMessage) -> Result<String, sqlx::Error> {
        let id = Uuid::new_v4().to_string();
        let created_at = to_db_time(msg.created_at);
        sqlx::query(
            "INSERT INTO edu_messages (id, user_id, chat_id, role, content, model, tokens, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&id)
        .bind(&key.user_id)
        .bind(&key.chat_id)
        .bind(msg.role.as_ref())
        .bind(msg.stored_content())
        .bind(&msg.model)
        .bind(msg.tokens.map(i64::from))
        .bind(&created_at)
        .execute(&self.pool)
        .await?;

        // Not atomic with the insert; a stale last_message_at is tolerated.
        sqlx::query(
            "UPDATE edu_chats SET last_message_at = ?1 WHERE user_id = ?2 AND chat_id = ?3",
        )
        .bind(&created_at)
        .bind(&key.user_id)
        .bind(&key.chat_id)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    async fn load_recent_history(
        &self,
        key: &ChatKey,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>, sqlx::Error> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<(Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT \
                 CASE WHEN typeof(role) = 'text' THEN role END, \
                 CASE WHEN typeof(content) = 'text' THEN content END \
             FROM edu_messages WHERE user_id = ?1 AND chat_id = ?2 \
             ORDER BY created_at DESC, seq DESC LIMIT ?3",
        )
        .bind(&key.user_id)
        .bind(&key.chat_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut history: Vec<HistoryMessage> = rows
            .into_iter()
            .filter_map(|(role, content)| Some(HistoryMessage { role: role?, content: content? }))
            .collect();
        history.reverse();
        Ok(history)
    }

    async fn list_messages(&self, key: &ChatKey) -> Result<Vec<ChatMessage>, sqlx::Error> {
        let rows: Vec<(String, Option<String>, Option<String>, Option<String>, Option<i64>, String)> =
            sqlx::query_as(
                "SELECT id, \
                     CASE WHEN typeof(role) = 'text' THEN role END, \
                     CASE WHEN typeof(content) = 'text' THEN content END, \
                     model, tokens, created_at \
                 FROM edu_messages WHERE user_id = ?1 AND chat_id = ?2 \
                 ORDER BY created_at ASC, seq ASC",
            )
            .bind(&key.user_id)
            .bind(&key.chat_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|(id, role, content, model, tokens, created_at)| -> Result<ChatMessage, sqlx::Error> {
                Ok(ChatMessage {
                    id,
                    role,
                    content,
                    model,
                    tokens,
                    created_at: from_db_time(&created_at, "created_at")?,
                })
            })
            .collect()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
