//! WebSocket pump: moves frames between one upgraded socket and its session.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::counter;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::manager::ConnectionManager;
use crate::metrics::{WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};

use super::session::OutboundFrame;

/// How long the writer may take to flush its close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Run one client connection from upgrade to close.
///
/// 1. Registers a session (which queues the version greeting)
/// 2. Spawns a writer draining the session's outbound queue
/// 3. Hands every inbound text frame to the session on its own task
/// 4. On close, marks the session closed and schedules a cleanup pass
#[instrument(skip_all, fields(client_id))]
pub async fn run_socket(ws: WebSocket, manager: Arc<ConnectionManager>) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (tx, mut rx) = mpsc::channel::<OutboundFrame>(manager.config().send_queue_capacity.max(1));
    let session = manager.add_session(tx);
    let _ = tracing::Span::current().record("client_id", session.id());
    counter!(WS_CONNECTIONS_TOTAL).increment(1);

    let closed = session.closed();
    let writer_session = session.clone();
    let mut writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = rx.recv() => {
                    let message = match frame {
                        Some(OutboundFrame::Text { payload, .. }) => Message::Text(payload.as_ref().into()),
                        Some(OutboundFrame::Ping) => Message::Ping(Vec::new().into()),
                        None => break,
                    };
                    if ws_tx.send(message).await.is_err() {
                        writer_session.terminate();
                        break;
                    }
                }
                () = closed.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let closed = session.closed();
    loop {
        let message = tokio::select! {
            message = ws_rx.next() => message,
            () = closed.cancelled() => break,
        };
        match message {
            Some(Ok(Message::Text(text))) => {
                let session = session.clone();
                drop(tokio::spawn(async move { session.receive(text.as_str()).await }));
            }
            Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                Ok(text) => {
                    let session = session.clone();
                    drop(tokio::spawn(async move { session.receive(&text).await }));
                }
                Err(_) => {
                    warn!(len = data.len(), "non-UTF-8 binary frame, closing connection");
                    break;
                }
            },
            Some(Ok(Message::Pong(_))) => session.acknowledge_ping(),
            // axum answers pings itself
            Some(Ok(Message::Ping(_))) => {}
            Some(Ok(Message::Close(_))) => {
                debug!("client sent close frame");
                break;
            }
            Some(Err(err)) => {
                debug!(error = %err, "websocket read failed");
                break;
            }
            None => break,
        }
    }

    session.terminate();
    if tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }
    manager.on_session_closed();
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    info!(age_secs = session.age().as_secs(), dropped = session.dropped_frames(), "client disconnected");
}
