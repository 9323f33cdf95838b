use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use super::session::Session;

/// Connection registry: tracks every live session per recipient.
/// A recipient can have many concurrent sessions (devices, tabs, rooms).
///
/// A recipient key is present only while its session list is non-empty.
/// `add`, `remove` and `snapshot` each run under the key's shard lock, so a
/// snapshot sees either the state before or after a concurrent mutation.
///
/// Once `close` has been called the registry refuses new sessions: `add`
/// retires them on the spot instead of storing them.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: DashMap<Uuid, Vec<Arc<Session>>>,
    closed: AtomicBool,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session under its recipient.
    pub fn add(&self, session: Arc<Session>) {
        let recipient_id = session.recipient_id();
        let session_id = session.id();
        let count = {
            let mut entry = self.sessions.entry(recipient_id).or_default();
            // Checked under the shard lock so a concurrent drain cannot miss us.
            if self.closed.load(Ordering::SeqCst) {
                None
            } else {
                entry.push(session.clone());
                Some(entry.len())
            }
        };
        let Some(count) = count else {
            // The empty list left behind by `or_default` must not linger.
            self.sessions.remove_if(&recipient_id, |_, sessions| sessions.is_empty());
            session.retire(false);
            tracing::debug!(
                recipient_id = %recipient_id,
                session_id = %session_id,
                "Session refused, registry is closed"
            );
            return;
        };
        tracing::debug!(
            recipient_id = %recipient_id,
            session_id = %session_id,
            sessions = count,
            "Session registered"
        );
    }

    /// Remove a session, dropping the recipient key once it has no sessions left.
    /// Returns `false` when the session was already gone.
    ///
    /// The caller that actually removes the session retires it, recording
    /// whether the recipient still had another session bound to the same room.
    /// That check runs under the same lock as the removal, so of two sessions
    /// leaving one room concurrently exactly one is seen as the last.
    pub fn remove(&self, session: &Session) -> bool {
        let outcome = match self.sessions.entry(session.recipient_id()) {
            Entry::Occupied(mut entry) => {
                let before = entry.get().len();
                entry.get_mut().retain(|s| s.id() != session.id());
                if entry.get().len() == before {
                    None
                } else {
                    let still_in_room = session.room_id().is_some()
                        && entry
                            .get()
                            .iter()
                            .any(|s| s.room_id() == session.room_id());
                    if entry.get().is_empty() {
                        entry.remove();
                    }
                    Some(!still_in_room)
                }
            }
            Entry::Vacant(_) => None,
        };

        let Some(last_in_room) = outcome else {
            return false;
        };
        session.retire(last_in_room);
        tracing::debug!(
            recipient_id = %session.recipient_id(),
            session_id = %session.id(),
            last_in_room,
            "Session unregistered"
        );
        true
    }

    pub fn is_live(&self, recipient_id: &Uuid) -> bool {
        self.sessions.contains_key(recipient_id)
    }

    /// Point-in-time copy of a recipient's sessions, in registration order.
    pub fn snapshot(&self, recipient_id: &Uuid) -> Vec<Arc<Session>> {
        self.sessions
            .get(recipient_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Copy of every registered session, used by the liveness sweep.
    pub fn snapshot_all(&self) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect()
    }

    /// Refuse every later `add`. Sessions already registered stay in place.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Remove and return every session without retiring them. Used at shutdown,
    /// after each session has been sent its final frame.
    pub fn drain(&self) -> Vec<Arc<Session>> {
        let mut drained = Vec::new();
        self.sessions.retain(|_, sessions| {
            drained.append(sessions);
            false
        });
        drained
    }

    pub fn recipient_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.iter().map(|entry| entry.value().len()).sum()
    }

    /// Register a session that is removed again when the returned guard drops.
    /// Suits transports whose body is dropped by the server on disconnect (SSE).
    pub fn register(self: &Arc<Self>, session: Arc<Session>) -> Registration {
        self.add(session.clone());
        Registration {
            registry: self.clone(),
            session,
        }
    }

    #[cfg(test)]
    fn keys_all_non_empty(&self) -> bool {
        self.sessions.iter().all(|entry| !entry.value().is_empty())
    }
}

/// Keeps a session registered for as long as it is alive.
#[derive(Debug)]
pub struct Registration {
    registry: Arc<ConnectionRegistry>,
    session: Arc<Session>,
}

impl Registration {
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.remove(&self.session);
    }
}
