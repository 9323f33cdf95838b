use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

/// Opaque per-connection identifier.
pub type SessionId = Uuid;

/// A named event with a JSON payload, shared by every session it fans out to.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    #[serde(rename = "event")]
    pub name: &'static str,
    pub data: serde_json::Value,
}

impl Event {
    pub fn new(name: &'static str, data: impl Serialize) -> Self {
        let data = serde_json::to_value(data).unwrap_or_else(|e| {
            tracing::warn!(event = name, error = %e, "Event payload failed to serialize");
            serde_json::Value::Null
        });
        Self { name, data }
    }
}

/// What a transport writer task receives from the rest of the system.
#[derive(Debug, Clone)]
pub enum Frame {
    Event(Arc<Event>),
    /// No-op liveness check. WebSocket writers send a ping, SSE writers a comment line.
    Heartbeat,
    /// Final frame before the server tears the session down.
    Close { code: u16, reason: &'static str },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WriteError {
    #[error("session transport is closed")]
    Closed,
    #[error("session write exceeded {0:?}")]
    Timeout(Duration),
}

/// A live transport handle bound to one recipient.
///
/// The transport itself (socket sink or SSE body) is owned by the connection's
/// task; the session only holds the bounded channel feeding that task, so a
/// write here never touches the network directly.
///
/// A session is retired exactly once, by whichever caller takes it out of its
/// registry. The connection task watches `retired()` and tears the transport
/// down when it fires, whether it was the task itself or a failing writer that
/// removed the session.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    recipient_id: Uuid,
    room_id: Option<Uuid>,
    tx: mpsc::Sender<Frame>,
    retired: CancellationToken,
    last_in_room: AtomicBool,
}

impl Session {
    pub fn new(recipient_id: Uuid, room_id: Option<Uuid>, tx: mpsc::Sender<Frame>) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient_id,
            room_id,
            tx,
            retired: CancellationToken::new(),
            last_in_room: AtomicBool::new(false),
        }
    }

    /// Create a session together with the receiving half its writer task drains.
    pub fn channel(
        recipient_id: Uuid,
        room_id: Option<Uuid>,
        buffer: usize,
    ) -> (Arc<Session>, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Arc::new(Self::new(recipient_id, room_id, tx)), rx)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn recipient_id(&self) -> Uuid {
        self.recipient_id
    }

    /// Chat room this session is bound to. `None` for notification streams.
    pub fn room_id(&self) -> Option<Uuid> {
        self.room_id
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the session has been taken out of its registry.
    pub fn retired(&self) -> WaitForCancellationFuture<'_> {
        self.retired.cancelled()
    }

    pub fn is_retired(&self) -> bool {
        self.retired.is_cancelled()
    }

    /// Whether no other session of the same recipient was bound to this room
    /// at the moment this one was removed. Always `false` before retirement.
    pub fn was_last_in_room(&self) -> bool {
        self.last_in_room.load(Ordering::Acquire)
    }

    /// Called by the registry with the room check it made under its lock.
    pub(crate) fn retire(&self, last_in_room: bool) {
        self.last_in_room.store(last_in_room, Ordering::Release);
        self.retired.cancel();
    }

    /// Queue a frame for the transport, waiting at most `deadline` for buffer space.
    pub async fn write(&self, frame: Frame, deadline: Duration) -> Result<(), WriteError> {
        match self.tx.send_timeout(frame, deadline).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Closed(_)) => Err(WriteError::Closed),
            Err(SendTimeoutError::Timeout(_)) => Err(WriteError::Timeout(deadline)),
        }
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Session {}
