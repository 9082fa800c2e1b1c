//! Free-text reply generation over a bounded conversation window.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::entities::{HistoryMessage, MessageRole};
use crate::error::ModelError;

/// Sampling temperature for replies.
pub const REPLY_TEMPERATURE: f32 = 0.4;

/// Upper bound on reply length, in model tokens.
pub const REPLY_MAX_OUTPUT_TOKENS: u32 = 1024;

/// Standing instruction given to the reply model.
pub const SYSTEM_INSTRUCTION: &str = "You are an Educational Assistant. Only answer academic topics \
(math, science, programming, history, languages, study skills). If the user asks about \
non-educational topics (e.g., celebrities, sports like Messi, entertainment, gossip, politics, \
adult topics), politely refuse with: \"Sorry, I can only help with educational topics. Try \
questions about math, science, history, languages, programming, exam prep, study skills, etc.\" \
Keep answers concise, well-structured, and cite concepts, not URLs.";

/// Speaker of a conversation turn sent to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: TurnRole::User, text: text.into() }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self { role: TurnRole::Model, text: text.into() }
    }
}

/// A reply as returned by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    /// Reply text, already trimmed. May be empty.
    pub text: String,
    /// Model identifier that produced the reply.
    pub model: String,
    /// Total tokens billed for the call, when the API reports it.
    pub tokens: Option<u32>,
}

#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(&self, conversation: &[Turn]) -> Result<Generation, ModelError>;
}

/// Turn stored history plus the new message into model input.
///
/// Only `user` and `model` history entries are forwarded; the new message is
/// always the last turn.
pub fn build_conversation(history: &[HistoryMessage], latest: &str) -> Vec<Turn> {
    let mut turns: Vec<Turn> = history
        .iter()
        .filter_map(|msg| match msg.role.parse::<MessageRole>() {
            Ok(MessageRole::User) => Some(Turn::user(msg.content.clone())),
            Ok(MessageRole::Model) => Some(Turn::model(msg.content.clone())),
            Ok(MessageRole::System) | Err(_) => None,
        })
        .collect();
    turns.push(Turn::user(latest));
    turns
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    fn entry(role: &str, content: &str) -> HistoryMessage {
        HistoryMessage {
            role: role.into(),
            content: content.into(),
        }
    }

    #[test]
    fn latest_message_is_appended_last() {
        let history = vec![entry("user", "what is 2+2?"), entry("model", "4")];
        let turns = build_conversation(&history, "and 3+3?");
        assert_eq!(
            turns,
            vec![Turn::user("what is 2+2?"), Turn::model("4"), Turn::user("and 3+3?")]
        );
    }

    #[test]
    fn other_roles_are_dropped() {
        let history = vec![
            entry("system", "be nice"),
            entry("assistant", "legacy"),
            entry("user", "hi"),
        ];
        let turns = build_conversation(&history, "next");
        assert_eq!(turns, vec![Turn::user("hi"), Turn::user("next")]);
    }

    #[test]
    fn empty_history_yields_single_turn() {
        assert_eq!(build_conversation(&[], "q"), vec![Turn::user("q")]);
    }
}
