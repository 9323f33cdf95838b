//! Periodic heartbeat over every registered session.
//!
//! A heartbeat is an ordinary write through the dispatcher, so a session that
//! cannot take it is evicted by the same code path as a failed broadcast.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::dispatch::Dispatcher;
use super::session::Frame;

/// Close code sent to every session when the server drains.
pub const CLOSE_GOING_AWAY: u16 = 1001;

pub struct LivenessMonitor {
    dispatchers: Vec<Dispatcher>,
    interval: Duration,
    cancel: CancellationToken,
    stopped: AtomicBool,
}

impl LivenessMonitor {
    pub fn new(dispatchers: Vec<Dispatcher>, interval: Duration) -> Self {
        Self {
            dispatchers,
            interval,
            cancel: CancellationToken::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Spawn the heartbeat loop. It runs until `shutdown` is called.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(monitor.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Skip the first immediate tick
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = monitor.cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        monitor.sweep().await;
                    }
                }
            }
            tracing::debug!("Liveness monitor stopped");
        })
    }

    /// Write one heartbeat to every session; returns how many are still alive.
    pub async fn sweep(&self) -> usize {
        let mut alive = 0;
        let mut swept = 0;
        for dispatcher in &self.dispatchers {
            let sessions = dispatcher.registry().snapshot_all();
            swept += sessions.len();
            alive += dispatcher.write_all(&sessions, Frame::Heartbeat).await;
        }

        if swept != alive {
            tracing::info!(
                swept = swept,
                evicted = swept - alive,
                "Liveness sweep evicted dead sessions"
            );
        } else {
            tracing::trace!(sessions = swept, "Liveness sweep complete");
        }
        alive
    }

    /// Stop the heartbeat loop, write a final close frame to every session and
    /// clear the registries. Calling it again is a no-op.
    ///
    /// Each registry is closed before its sessions are collected, so a session
    /// joining mid-shutdown is retired by `add` instead of being stranded. A
    /// session that cannot take its close frame is evicted and retired by the
    /// dispatcher like any other failed write.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();

        let mut closed = 0;
        for dispatcher in &self.dispatchers {
            let registry = dispatcher.registry();
            registry.close();
            let sessions = registry.snapshot_all();
            closed += dispatcher
                .write_all(
                    &sessions,
                    Frame::Close {
                        code: CLOSE_GOING_AWAY,
                        reason: "server shutting down",
                    },
                )
                .await;
            registry.drain();
        }
        tracing::info!(sessions = closed, "Realtime sessions drained");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}
