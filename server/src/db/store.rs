//! The narrow storage interface the real-time core depends on.

use async_trait::async_trait;
use std::collections::HashSet;
use uuid::Uuid;

use super::models::ChatMessage;
use super::{chats, Database, StoreError};

/// Room membership and transcript access, as seen by the delivery core.
///
/// Storage is the single source of truth for membership; callers never cache
/// the returned set beyond one operation.
#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn load_room_membership(&self, room_id: Uuid) -> Result<HashSet<Uuid>, StoreError>;

    async fn persist_message(
        &self,
        room_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> Result<ChatMessage, StoreError>;
}

#[async_trait]
impl RoomStore for Database {
    async fn load_room_membership(&self, room_id: Uuid) -> Result<HashSet<Uuid>, StoreError> {
        self.run(move |conn| chats::chat_members(conn, room_id)).await
    }

    async fn persist_message(
        &self,
        room_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> Result<ChatMessage, StoreError> {
        let content = content.to_string();
        self.run(move |conn| chats::append_message(conn, room_id, sender_id, &content))
            .await
    }
}
