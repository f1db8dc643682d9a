//! Controller log forwarder.
//!
//! Runs only while at least one session listens to logs. The controller's
//! log level and the filter supplied by the first listener are captured when
//! the forwarder starts and re-read on every restart.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use wavegate_core::controller::Controller;
use wavegate_core::logs::{LogFilter, LogLevel, LogRecord};

use crate::protocol::codec;
use crate::protocol::messages::OutgoingMessage;
use crate::websocket::registry::SessionRegistry;

struct Running {
    filter: Option<LogFilter>,
    task: JoinHandle<()>,
}

/// Forwards controller log records to log-listening sessions.
pub struct LoggingForwarder {
    controller: Arc<dyn Controller>,
    registry: Arc<SessionRegistry>,
    running: Mutex<Option<Running>>,
}

impl LoggingForwarder {
    /// Create a stopped forwarder.
    pub fn new(controller: Arc<dyn Controller>, registry: Arc<SessionRegistry>) -> Self {
        Self {
            controller,
            registry,
            running: Mutex::new(None),
        }
    }

    /// Whether the forwarder is started.
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Start with `filter` unless already running. Returns whether it started.
    pub fn start(&self, filter: Option<LogFilter>) -> bool {
        let mut running = self.running.lock();
        if running.is_some() {
            return false;
        }
        *running = Some(self.spawn(filter));
        info!("logging forwarder started");
        true
    }

    /// Re-read the controller log level and resubscribe, if running.
    pub fn restart_if_needed(&self) {
        let mut running = self.running.lock();
        if let Some(current) = running.take() {
            current.task.abort();
            *running = Some(self.spawn(current.filter));
            debug!("logging forwarder restarted");
        }
    }

    /// Stop forwarding and release the subscription.
    pub fn stop(&self) {
        if let Some(current) = self.running.lock().take() {
            current.task.abort();
            info!("logging forwarder stopped");
        }
    }

    fn spawn(&self, filter: Option<LogFilter>) -> Running {
        let level = self.controller.log_config().level;
        let rx = self.controller.subscribe_logs();
        let task = tokio::spawn(forward_logs(rx, self.registry.clone(), level, filter.clone()));
        Running { filter, task }
    }
}

async fn forward_logs(
    mut rx: broadcast::Receiver<LogRecord>,
    registry: Arc<SessionRegistry>,
    level: LogLevel,
    filter: Option<LogFilter>,
) {
    loop {
        match rx.recv().await {
            Ok(record) => {
                if record.level < level || !filter.as_ref().is_none_or(|f| f.matches(&record)) {
                    continue;
                }
                let message = OutgoingMessage::Event {
                    event: record.to_event(),
                };
                match codec::encode(&message) {
                    Ok(payload) => {
                        let _ = registry.forward_log(&payload);
                    }
                    Err(err) => error!(error = %err, "failed to encode log record"),
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "logging forwarder lagged, records dropped");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("controller log stream closed");
                break;
            }
        }
    }
}
