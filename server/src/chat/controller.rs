//! Chat room controller: membership-checked join, send and leave.
//!
//! Membership is loaded from storage on every join and every send, so a
//! member removed mid-session is rejected on their next message.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use super::protocol;
use crate::db::models::ChatMessage;
use crate::db::store::RoomStore;
use crate::db::StoreError;
use crate::realtime::{Dispatcher, Frame, Session};

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("user {0} is not a member of the room")]
    NotMember(Uuid),
    #[error("message content is empty or too long")]
    InvalidContent,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ChatError {
    /// Code carried in error frames sent to the chat client.
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::NotMember(_) | ChatError::Store(StoreError::ChatNotFound(_)) => {
                "USER_NOT_AUTHORIZED"
            }
            ChatError::InvalidContent => "INVALID_CONTENT",
            ChatError::Store(_) => "INTERNAL_ERROR",
        }
    }
}

pub struct ChatRooms {
    store: Arc<dyn RoomStore>,
    dispatcher: Dispatcher,
    session_buffer: usize,
    /// One lock per room with a send in flight; keeps persist and broadcast in append order.
    sequencers: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl ChatRooms {
    pub fn new(store: Arc<dyn RoomStore>, dispatcher: Dispatcher, session_buffer: usize) -> Self {
        Self {
            store,
            dispatcher,
            session_buffer,
            sequencers: DashMap::new(),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    async fn require_member(&self, room_id: Uuid, user_id: Uuid) -> Result<HashSet<Uuid>, ChatError> {
        let members = self.store.load_room_membership(room_id).await?;
        if members.contains(&user_id) {
            Ok(members)
        } else {
            Err(ChatError::NotMember(user_id))
        }
    }

    /// Bind a new session for `user_id` to `room_id` and announce it to the room,
    /// the joining user included.
    pub async fn join(
        &self,
        user_id: Uuid,
        room_id: Uuid,
    ) -> Result<(Arc<Session>, mpsc::Receiver<Frame>), ChatError> {
        let members = self.require_member(room_id, user_id).await?;

        let (session, rx) = Session::channel(user_id, Some(room_id), self.session_buffer);
        self.dispatcher.registry().add(session.clone());
        if session.is_retired() {
            tracing::debug!(recipient_id = %user_id, room_id = %room_id, "Join refused, server draining");
            return Ok((session, rx));
        }
        tracing::info!(
            recipient_id = %user_id,
            room_id = %room_id,
            session_id = %session.id(),
            "Joined chat room"
        );

        self.dispatcher
            .send_to_members(
                &members,
                room_id,
                Arc::new(protocol::user_joined(user_id, room_id)),
                None,
            )
            .await;
        Ok((session, rx))
    }

    /// Persist a message and fan it out to every member of the room.
    ///
    /// Nothing is broadcast unless the append succeeded. Delivery failures to
    /// other members never fail the send.
    pub async fn post(
        &self,
        sender_id: Uuid,
        room_id: Uuid,
        content: &str,
    ) -> Result<ChatMessage, ChatError> {
        let content = protocol::normalize_content(content).ok_or(ChatError::InvalidContent)?;

        let sequencer = self
            .sequencers
            .entry(room_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _turn = sequencer.lock().await;
            self.persist_and_broadcast(sender_id, room_id, content).await
        };

        drop(sequencer);
        self.sequencers
            .remove_if(&room_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn persist_and_broadcast(
        &self,
        sender_id: Uuid,
        room_id: Uuid,
        content: &str,
    ) -> Result<ChatMessage, ChatError> {
        let members = self.require_member(room_id, sender_id).await?;
        let message = self
            .store
            .persist_message(room_id, sender_id, content)
            .await?;

        let delivered = self
            .dispatcher
            .send_to_members(
                &members,
                room_id,
                Arc::new(protocol::new_message(room_id, &message)),
                None,
            )
            .await;
        tracing::debug!(
            sender_id = %sender_id,
            room_id = %room_id,
            delivered = delivered,
            "Chat message delivered"
        );
        Ok(message)
    }

    /// Unregister a chat session. When it was the user's last session in the
    /// room, the remaining members get `user_left`.
    ///
    /// Call once per session when its connection ends. The session may already
    /// have been evicted by a failed write; the last-in-room answer recorded by
    /// that removal is used then.
    pub async fn leave(&self, session: &Session) {
        let Some(room_id) = session.room_id() else {
            return;
        };
        let user_id = session.recipient_id();
        self.dispatcher.registry().remove(session);
        if !session.was_last_in_room() {
            return;
        }

        tracing::info!(recipient_id = %user_id, room_id = %room_id, "Left chat room");
        if let Err(e) = self
            .dispatcher
            .broadcast_to_room(
                self.store.as_ref(),
                room_id,
                protocol::user_left(user_id, room_id),
                Some(user_id),
            )
            .await
        {
            tracing::warn!(room_id = %room_id, error = %e, "Failed to announce departure");
        }
    }

    /// Tell a room that `user_id` was added to it outside a chat session.
    pub async fn announce_join(&self, room_id: Uuid, user_id: Uuid) {
        if let Err(e) = self
            .dispatcher
            .broadcast_to_room(
                self.store.as_ref(),
                room_id,
                protocol::user_joined(user_id, room_id),
                None,
            )
            .await
        {
            tracing::warn!(room_id = %room_id, error = %e, "Failed to announce new member");
        }
    }

    #[cfg(test)]
    fn sequencer_count(&self) -> usize {
        self.sequencers.len()
    }
}
