//! Periodic liveness supervision of every session.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::manager::ConnectionManager;

/// Why the heartbeat loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatExit {
    /// Stopped through its cancellation token.
    Cancelled,
    /// The manager it supervises is gone.
    ManagerDropped,
}

/// Handle to a running heartbeat task.
pub struct Heartbeat {
    cancel: CancellationToken,
    task: JoinHandle<HeartbeatExit>,
}

impl Heartbeat {
    /// Spawn the heartbeat for `manager`, ticking every `interval`.
    pub fn spawn(manager: Weak<ConnectionManager>, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let interval = interval.max(Duration::from_millis(1));
        let task = tokio::spawn(run_heartbeat(manager, interval, cancel.clone()));
        Self { cancel, task }
    }

    /// Stop ticking. The task exits at its next poll.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether the task is still running.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Run heartbeat ticks until cancelled or the manager is dropped.
///
/// The first tick fires one full `interval` after start.
pub async fn run_heartbeat(
    manager: Weak<ConnectionManager>,
    interval: Duration,
    cancel: CancellationToken,
) -> HeartbeatExit {
    let mut ticker = time::interval(interval);
    // Skip the immediate first tick
    let _ = ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(manager) = manager.upgrade() else {
                    debug!("heartbeat stopping, manager dropped");
                    return HeartbeatExit::ManagerDropped;
                };
                manager.heartbeat_tick();
            }
            () = cancel.cancelled() => {
                return HeartbeatExit::Cancelled;
            }
        }
    }
}
