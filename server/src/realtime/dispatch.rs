use futures_util::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::registry::ConnectionRegistry;
use super::session::{Event, Frame, Session};
use crate::db::store::RoomStore;
use crate::db::StoreError;

/// Fans events out to the live sessions held by one registry.
///
/// Every write is bounded by `write_timeout`. A session whose write fails or
/// times out is evicted through `ConnectionRegistry::remove`, the same path a
/// client disconnect takes. Removal retires the session, which tells its
/// connection task to close the transport. The failure is logged and never
/// reaches the caller.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
    write_timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>, write_timeout: Duration) -> Self {
        Self {
            registry,
            write_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Deliver an event to every live session of `recipient_id`.
    /// Returns how many sessions accepted it; an offline recipient yields 0.
    pub async fn send(&self, recipient_id: Uuid, event: impl Into<Arc<Event>>) -> usize {
        self.send_matching(recipient_id, event.into(), |_| true).await
    }

    /// Like `send`, restricted to the sessions `filter` accepts.
    pub async fn send_matching<F>(&self, recipient_id: Uuid, event: Arc<Event>, filter: F) -> usize
    where
        F: Fn(&Session) -> bool,
    {
        let sessions: Vec<Arc<Session>> = self
            .registry
            .snapshot(&recipient_id)
            .into_iter()
            .filter(|session| filter(session.as_ref()))
            .collect();

        if sessions.is_empty() {
            tracing::trace!(
                recipient_id = %recipient_id,
                event = event.name,
                "Recipient offline, event not delivered"
            );
            return 0;
        }

        self.write_all(&sessions, Frame::Event(event)).await
    }

    /// Resolve the room's members and deliver the event to each of them.
    /// Sessions bound to a different room are skipped.
    pub async fn broadcast_to_room<S>(
        &self,
        store: &S,
        room_id: Uuid,
        event: impl Into<Arc<Event>>,
        excluding: Option<Uuid>,
    ) -> Result<usize, StoreError>
    where
        S: RoomStore + ?Sized,
    {
        let members = store.load_room_membership(room_id).await?;
        Ok(self
            .send_to_members(&members, room_id, event.into(), excluding)
            .await)
    }

    /// Room fan-out over an already resolved member set.
    pub async fn send_to_members(
        &self,
        members: &HashSet<Uuid>,
        room_id: Uuid,
        event: Arc<Event>,
        excluding: Option<Uuid>,
    ) -> usize {
        let sends = members
            .iter()
            .copied()
            .filter(|member| Some(*member) != excluding)
            .map(|member| {
                self.send_matching(member, event.clone(), move |session| {
                    session.room_id().map_or(true, |bound| bound == room_id)
                })
            });

        let delivered: usize = join_all(sends).await.into_iter().sum();
        tracing::debug!(
            room_id = %room_id,
            event = event.name,
            delivered = delivered,
            "Room broadcast complete"
        );
        delivered
    }

    /// Write one frame to each session concurrently, evicting the ones that fail.
    pub async fn write_all(&self, sessions: &[Arc<Session>], frame: Frame) -> usize {
        let writes = sessions.iter().map(|session| {
            let frame = frame.clone();
            async move { (session, session.write(frame, self.write_timeout).await) }
        });

        let mut delivered = 0;
        for (session, result) in join_all(writes).await {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        recipient_id = %session.recipient_id(),
                        session_id = %session.id(),
                        error = %e,
                        "Session write failed, evicting"
                    );
                    self.registry.remove(session);
                }
            }
        }
        delivered
    }
}
