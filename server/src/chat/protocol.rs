//! Chat wire protocol.
//!
//! Server frames are JSON text messages `{"event": <name>, "data": <payload>}`.
//! Clients send commands in the same shape.

use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::db::models::ChatMessage;
use crate::realtime::Event;

pub const NEW_MESSAGE: &str = "new_message";
pub const USER_JOINED: &str = "user_joined";
pub const USER_LEFT: &str = "user_left";
pub const ERROR: &str = "error";

/// Error frame types.
pub const JOIN_CHAT_ERROR: &str = "JOIN_CHAT_ERROR";
pub const SEND_MESSAGE_ERROR: &str = "SEND_MESSAGE_ERROR";

/// Maximum message content length (chars).
pub const MAX_CONTENT_LENGTH: usize = 4000;

pub fn new_message(chat_id: Uuid, message: &ChatMessage) -> Event {
    Event::new(NEW_MESSAGE, json!({ "chatId": chat_id, "message": message }))
}

pub fn user_joined(user_profile_id: Uuid, chat_id: Uuid) -> Event {
    Event::new(
        USER_JOINED,
        json!({ "userProfileId": user_profile_id, "chatId": chat_id }),
    )
}

pub fn user_left(user_profile_id: Uuid, chat_id: Uuid) -> Event {
    Event::new(
        USER_LEFT,
        json!({ "userProfileId": user_profile_id, "chatId": chat_id }),
    )
}

pub fn error(kind: &str, message: &str) -> Event {
    Event::new(ERROR, json!({ "type": kind, "message": message }))
}

/// Commands a bound chat session may send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    SendMessage { content: String },
    LeaveChat,
}

pub fn parse_command(text: &str) -> Result<ClientCommand, serde_json::Error> {
    serde_json::from_str(text)
}

/// Trim and bound message content. `None` means the content is unusable.
pub fn normalize_content(content: &str) -> Option<&str> {
    let trimmed = content.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_CONTENT_LENGTH {
        None
    } else {
        Some(trimmed)
    }
}
