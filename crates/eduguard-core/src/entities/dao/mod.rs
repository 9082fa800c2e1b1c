pub mod chat;
pub mod message;

pub use chat::{ChatKey, ChatRecord, DEFAULT_CHAT_TITLE};
pub use message::{
    ChatMessage, HistoryMessage, MessageRole, NewMessage, HISTORY_LIMIT, MAX_CONTENT_CHARS,
};
