//! Helpers shared by unit tests.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use wavegate_core::sim::SimulatedController;

use crate::config::ServerConfig;
use crate::handlers::HandlerTable;
use crate::manager::ConnectionManager;
use crate::websocket::session::{ClientSession, OutboundFrame};

/// Manager over a fresh simulator with default settings.
pub(crate) fn gateway_manager() -> (Arc<ConnectionManager>, Arc<SimulatedController>) {
    manager_with(ServerConfig::default())
}

/// Manager over a fresh simulator with `config`.
pub(crate) fn manager_with(config: ServerConfig) -> (Arc<ConnectionManager>, Arc<SimulatedController>) {
    let sim = Arc::new(SimulatedController::new(0xcafe));
    let manager = ConnectionManager::new(sim.clone(), config, HandlerTable::default(), None);
    (manager, sim)
}

/// Register a session backed by an in-memory queue.
pub(crate) fn connect(
    manager: &Arc<ConnectionManager>,
) -> (Arc<ClientSession>, mpsc::Receiver<OutboundFrame>) {
    let (tx, rx) = mpsc::channel(64);
    (manager.add_session(tx), rx)
}

/// Next queued frame, failing the test after two seconds.
pub(crate) async fn next_frame(rx: &mut mpsc::Receiver<OutboundFrame>) -> OutboundFrame {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for frame")
        .expect("outbound queue closed")
}

/// Next text frame as JSON, skipping probes.
pub(crate) async fn next_json(rx: &mut mpsc::Receiver<OutboundFrame>) -> Value {
    loop {
        if let OutboundFrame::Text { payload, .. } = next_frame(rx).await {
            return serde_json::from_str(&payload).expect("frame is not JSON");
        }
    }
}

/// Assert nothing is queued right now.
pub(crate) fn no_frame(rx: &mut mpsc::Receiver<OutboundFrame>) {
    assert!(rx.try_recv().is_err(), "unexpected frame queued");
}
