//! Real-time delivery core shared by the chat and notification transports.

pub mod dispatch;
pub mod liveness;
pub mod registry;
pub mod session;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

pub use dispatch::Dispatcher;
pub use liveness::LivenessMonitor;
pub use registry::{ConnectionRegistry, Registration};
pub use session::{Event, Frame, Session, SessionId, WriteError};

/// Tunables for the delivery core, taken from the server config.
#[derive(Debug, Clone, Copy)]
pub struct RealtimeSettings {
    pub heartbeat_interval: Duration,
    pub write_timeout: Duration,
    pub session_buffer: usize,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            write_timeout: Duration::from_secs(3),
            session_buffer: 64,
        }
    }
}

/// Owns the chat and notification registries for the lifetime of the process.
///
/// Created once at start-up and injected into every connection handler;
/// torn down by a single `shutdown` call.
pub struct Realtime {
    pub chat: Dispatcher,
    pub notifications: Dispatcher,
    monitor: Arc<LivenessMonitor>,
    settings: RealtimeSettings,
}

impl Realtime {
    pub fn new(settings: RealtimeSettings) -> Self {
        let chat = Dispatcher::new(Arc::new(ConnectionRegistry::new()), settings.write_timeout);
        let notifications =
            Dispatcher::new(Arc::new(ConnectionRegistry::new()), settings.write_timeout);
        let monitor = Arc::new(LivenessMonitor::new(
            vec![chat.clone(), notifications.clone()],
            settings.heartbeat_interval,
        ));
        Self {
            chat,
            notifications,
            monitor,
            settings,
        }
    }

    pub fn settings(&self) -> RealtimeSettings {
        self.settings
    }

    pub fn spawn_liveness(&self) -> JoinHandle<()> {
        self.monitor.spawn()
    }

    /// Close every session and stop the heartbeat loop. Idempotent.
    pub async fn shutdown(&self) {
        self.monitor.shutdown().await;
    }
}
