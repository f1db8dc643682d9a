//! Domain event forwarder.
//!
//! Subscribes to the controller's event stream and hands every event to the
//! session registry, which delivers it to each session whose subscription
//! covers the event's sequence number.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use wavegate_core::controller::Controller;
use wavegate_core::events::ControllerEvent;

use crate::websocket::registry::SessionRegistry;

/// Forwards controller events to listening sessions.
pub struct EventForwarder {
    controller: Arc<dyn Controller>,
    registry: Arc<SessionRegistry>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EventForwarder {
    /// Create a stopped forwarder.
    pub fn new(controller: Arc<dyn Controller>, registry: Arc<SessionRegistry>) -> Self {
        Self {
            controller,
            registry,
            task: Mutex::new(None),
        }
    }

    /// Subscribe and start forwarding. No-op while already running.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        *task = Some(self.spawn());
        debug!("event forwarder started");
    }

    /// Drop the current subscription and subscribe again.
    pub fn restart(&self) {
        let mut task = self.task.lock();
        if let Some(old) = task.take() {
            old.abort();
        }
        *task = Some(self.spawn());
        info!("event forwarder resubscribed");
    }

    /// Stop forwarding.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            debug!("event forwarder stopped");
        }
    }

    /// Whether the forwarding task is alive.
    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| !t.is_finished())
    }

    fn spawn(&self) -> JoinHandle<()> {
        // subscribe before spawning so nothing published after start is missed
        let rx = self.controller.subscribe_events();
        tokio::spawn(forward_events(rx, self.registry.clone()))
    }
}

async fn forward_events(
    mut rx: broadcast::Receiver<ControllerEvent>,
    registry: Arc<SessionRegistry>,
) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let delivered = registry.forward_event(&event);
                trace!(event = %event.event, seq = event.seq, delivered, "event forwarded");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event forwarder lagged, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("controller event stream closed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::session::{ClientSession, OutboundFrame};
    use std::sync::Weak;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use wavegate_core::sim::SimulatedController;

    fn setup() -> (Arc<SimulatedController>, Arc<SessionRegistry>, EventForwarder) {
        let sim = Arc::new(SimulatedController::new(1));
        let registry = Arc::new(SessionRegistry::new());
        let forwarder = EventForwarder::new(sim.clone(), registry.clone());
        (sim, registry, forwarder)
    }

    fn listening_session(registry: &SessionRegistry) -> mpsc::Receiver<OutboundFrame> {
        let (tx, rx) = mpsc::channel(16);
        let session = Arc::new(ClientSession::new(tx, 0, Weak::new()));
        session.mark_listening(0);
        registry.add(session);
        rx
    }

    async fn recv_event(rx: &mut mpsc::Receiver<OutboundFrame>) -> serde_json::Value {
        let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match frame {
            OutboundFrame::Text { payload, .. } => serde_json::from_str(&payload).unwrap(),
            OutboundFrame::Ping => panic!("unexpected ping"),
        }
    }

    #[tokio::test]
    async fn forwards_in_publish_order() {
        let (sim, registry, forwarder) = setup();
        let mut rx = listening_session(&registry);
        forwarder.start();

        let _ = sim.add_node(2, None);
        let _ = sim.add_node(3, None);

        assert_eq!(recv_event(&mut rx).await["event"]["node"]["nodeId"], 2);
        assert_eq!(recv_event(&mut rx).await["event"]["node"]["nodeId"], 3);
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let (sim, registry, forwarder) = setup();
        let mut rx = listening_session(&registry);
        forwarder.start();
        forwarder.start();

        let _ = sim.add_node(2, None);
        let _ = recv_event(&mut rx).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err(), "event delivered twice");
    }

    #[tokio::test]
    async fn restart_after_stream_closed() {
        let (sim, registry, forwarder) = setup();
        let mut rx = listening_session(&registry);
        forwarder.start();

        sim.hard_reset().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!forwarder.is_running());

        forwarder.restart();
        assert!(forwarder.is_running());
        let _ = sim.add_node(7, None);
        assert_eq!(recv_event(&mut rx).await["event"]["node"]["nodeId"], 7);
    }

    #[tokio::test]
    async fn stop() {
        let (_sim, _registry, forwarder) = setup();
        forwarder.start();
        forwarder.stop();
        assert!(!forwarder.is_running());
    }
}
