//! One connected client: protocol state, command dispatch and replies.
//!
//! A session never touches the socket directly. Everything it sends goes
//! through a bounded outbound queue drained by the socket writer task
//! ([`super::socket`]). Replies wait for queue space; fan-out frames
//! (events, logs, probes) are dropped when the queue is full.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use futures::FutureExt;
use metrics::{counter, histogram};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, error, instrument, warn};
use wavegate_core::controller::Controller;
use wavegate_core::errors::GatewayError;
use wavegate_core::events::{ControllerEvent, EventSource};
use wavegate_core::logs::LogConfigUpdate;

use crate::SERVER_VERSION;
use crate::config::ServerConfig;
use crate::handlers::HandlerContext;
use crate::manager::ConnectionManager;
use crate::metrics::{
    COMMAND_DURATION_SECONDS, COMMAND_ERRORS_TOTAL, COMMANDS_TOTAL, FANOUT_DROPS_TOTAL,
    HEARTBEAT_TERMINATIONS_TOTAL,
};
use crate::protocol::codec;
use crate::protocol::commands;
use crate::protocol::messages::{IncomingMessage, OutgoingMessage, ResultMessage, VersionInfo};
use crate::protocol::router;

/// A frame queued for the socket writer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundFrame {
    /// JSON text frame. `compress` marks payloads worth compressing.
    Text {
        /// Encoded message.
        payload: Arc<str>,
        /// Compression hint.
        compress: bool,
    },
    /// Transport-level liveness probe.
    Ping,
}

/// A connected client.
pub struct ClientSession {
    id: String,
    tx: mpsc::Sender<OutboundFrame>,
    closed: CancellationToken,
    connected: AtomicBool,
    schema_version: AtomicU32,
    receive_events: AtomicBool,
    events_after: AtomicU64,
    receive_logs: AtomicBool,
    outstanding_ping: AtomicBool,
    client_metadata: Mutex<HashMap<String, String>>,
    connected_at: Instant,
    dropped_frames: AtomicU64,
    manager: Weak<ConnectionManager>,
}

impl ClientSession {
    /// New session speaking `schema_version` until the client negotiates.
    pub fn new(
        tx: mpsc::Sender<OutboundFrame>,
        schema_version: u32,
        manager: Weak<ConnectionManager>,
    ) -> Self {
        Self {
            id: format!("client_{}", uuid::Uuid::now_v7()),
            tx,
            closed: CancellationToken::new(),
            connected: AtomicBool::new(true),
            schema_version: AtomicU32::new(schema_version),
            receive_events: AtomicBool::new(false),
            events_after: AtomicU64::new(0),
            receive_logs: AtomicBool::new(false),
            outstanding_ping: AtomicBool::new(false),
            client_metadata: Mutex::new(HashMap::new()),
            connected_at: Instant::now(),
            dropped_frames: AtomicU64::new(0),
            manager,
        }
    }

    /// Per-connection id, for logs.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the transport is still open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Negotiated schema version.
    pub fn schema_version(&self) -> u32 {
        self.schema_version.load(Ordering::Acquire)
    }

    /// Whether `startListening` has succeeded.
    pub fn receives_events(&self) -> bool {
        self.receive_events.load(Ordering::Acquire)
    }

    /// Whether the event with sequence number `seq` is due to this session.
    pub fn wants_event(&self, seq: u64) -> bool {
        self.receives_events() && seq > self.events_after.load(Ordering::Acquire)
    }

    /// Whether the client listens to controller logs.
    pub fn receives_logs(&self) -> bool {
        self.receive_logs.load(Ordering::Acquire)
    }

    /// Toggle log listening.
    pub fn set_receive_logs(&self, receive: bool) {
        self.receive_logs.store(receive, Ordering::Release);
    }

    /// Metadata supplied at `initialize`.
    pub fn client_metadata(&self) -> HashMap<String, String> {
        self.client_metadata.lock().clone()
    }

    /// Whether a liveness probe is waiting for its pong.
    pub fn has_outstanding_ping(&self) -> bool {
        self.outstanding_ping.load(Ordering::Acquire)
    }

    /// Fan-out frames dropped so far.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Time since the connection was accepted.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Cancelled once the session is closed.
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Mark the session closed and signal the socket to shut down.
    /// Idempotent.
    pub fn terminate(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            debug!(client_id = %self.id, "session closed");
        }
        self.closed.cancel();
    }

    /// Queue a fan-out frame without waiting.
    ///
    /// Returns `false` if the frame was dropped (queue full or closed).
    pub fn send_frame(&self, payload: Arc<str>, compress: bool) -> bool {
        if !self.is_connected() {
            return false;
        }
        match self.tx.try_send(OutboundFrame::Text { payload, compress }) {
            Ok(()) => true,
            Err(err) => {
                let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                counter!(FANOUT_DROPS_TOTAL).increment(1);
                if matches!(err, TrySendError::Closed(_)) {
                    self.terminate();
                }
                false
            }
        }
    }

    /// Queue the unsolicited version greeting.
    pub fn send_version(&self, controller: &dyn Controller, config: &ServerConfig) {
        let greeting = OutgoingMessage::Version(VersionInfo {
            driver_version: controller.driver_version(),
            server_version: SERVER_VERSION.to_string(),
            home_id: controller.home_id(),
            min_schema_version: config.min_schema_version,
            max_schema_version: config.max_schema_version,
        });
        match codec::encode(&greeting) {
            Ok(payload) => {
                if !self.send_frame(payload, false) {
                    warn!(client_id = %self.id, "failed to queue version greeting");
                }
            }
            Err(err) => error!(client_id = %self.id, error = %err, "failed to encode version greeting"),
        }
    }

    /// Heartbeat probe.
    ///
    /// Force-closes the session if the previous probe is still unanswered,
    /// otherwise marks a probe outstanding and queues a Ping. Returns whether
    /// the session is still alive.
    pub fn probe_liveness(&self) -> bool {
        if self.outstanding_ping.swap(true, Ordering::AcqRel) {
            warn!(client_id = %self.id, "no pong since last probe, terminating");
            counter!(HEARTBEAT_TERMINATIONS_TOTAL).increment(1);
            self.terminate();
            return false;
        }
        match self.tx.try_send(OutboundFrame::Ping) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(client_id = %self.id, "outbound queue full, probe not sent");
                true
            }
            Err(TrySendError::Closed(_)) => {
                self.terminate();
                false
            }
        }
    }

    /// Start event delivery for events published after `after_seq`.
    pub(crate) fn mark_listening(&self, after_seq: u64) {
        self.events_after.store(after_seq, Ordering::Release);
        self.receive_events.store(true, Ordering::Release);
    }

    /// Transport-level Pong received.
    pub fn acknowledge_ping(&self) {
        self.outstanding_ping.store(false, Ordering::Release);
    }

    /// Handle one inbound text frame.
    ///
    /// Undecodable frames close the connection without a reply. Every decoded
    /// message gets exactly one reply addressed to its `messageId`.
    #[instrument(skip_all, fields(client_id = %self.id, command, message_id))]
    pub async fn receive(self: &Arc<Self>, raw: &str) {
        let message = match codec::decode(raw) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "unable to decode frame, closing connection");
                self.terminate();
                return;
            }
        };
        let span = Span::current();
        let _ = span.record("command", message.command.as_str());
        let _ = span.record("message_id", message.message_id.as_str());

        let Some(manager) = self.manager.upgrade() else {
            debug!("gateway is shutting down, dropping message");
            return;
        };

        let start = Instant::now();
        let outcome = AssertUnwindSafe(self.dispatch(&message, &manager))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(GatewayError::internal("command handler panicked")));
        histogram!(COMMAND_DURATION_SECONDS).record(start.elapsed().as_secs_f64());

        let reply = match outcome {
            // reply already queued
            Ok(None) => return,
            Ok(Some(result)) => ResultMessage::success(&message.message_id, result),
            Err(err) => {
                report_failure(&err);
                ResultMessage::failure(&message.message_id, &err, self.schema_version())
            }
        };
        self.reply(&OutgoingMessage::Result(reply)).await;
    }

    async fn dispatch(
        self: &Arc<Self>,
        message: &IncomingMessage,
        manager: &Arc<ConnectionManager>,
    ) -> Result<Option<Value>, GatewayError> {
        match message.command.as_str() {
            commands::INITIALIZE => {
                let metadata = parse_client_metadata(message)?;
                self.negotiate_schema(message, manager.config())?;
                if let Some(metadata) = metadata {
                    *self.client_metadata.lock() = metadata;
                }
                Ok(Some(json!({})))
            }
            commands::SET_API_SCHEMA => {
                self.negotiate_schema(message, manager.config())?;
                Ok(Some(json!({})))
            }
            commands::START_LISTENING => {
                self.start_listening(manager, &message.message_id).await?;
                Ok(None)
            }
            commands::GET_LOG_CONFIG => Ok(Some(json!({ "config": manager.controller().log_config() }))),
            commands::UPDATE_LOG_CONFIG => {
                let raw = message
                    .field("config")
                    .cloned()
                    .ok_or_else(|| GatewayError::invalid_params("config is required"))?;
                let update: LogConfigUpdate = serde_json::from_value(raw)
                    .map_err(|err| GatewayError::invalid_params(format!("invalid log config: {err}")))?;
                manager.controller().update_log_config(update)?;
                manager.restart_logging_if_needed();
                let config = manager.controller().log_config();
                manager.broadcast_driver_event(
                    &ControllerEvent::new(EventSource::Driver, "log config updated")
                        .with("config", json!(config)),
                );
                manager.cleanup_logging_forwarder();
                Ok(Some(json!({})))
            }
            command => {
                let route = router::route(command).ok_or_else(|| GatewayError::UnknownCommand {
                    command: command.to_string(),
                })?;
                counter!(COMMANDS_TOTAL, "namespace" => route.namespace.prefix()).increment(1);
                let handler = manager.handlers().get(route.namespace).clone();
                let ctx = HandlerContext {
                    manager: manager.clone(),
                    session: self.clone(),
                };
                handler.handle(route.verb, message, &ctx).await.map(Some)
            }
        }
    }

    fn negotiate_schema(
        &self,
        message: &IncomingMessage,
        config: &ServerConfig,
    ) -> Result<(), GatewayError> {
        let requested = message
            .field("schemaVersion")
            .and_then(Value::as_i64)
            .ok_or_else(|| GatewayError::invalid_params("schemaVersion must be an integer"))?;
        if !config.supports_schema(requested) {
            return Err(GatewayError::SchemaIncompatible {
                requested,
                min: config.min_schema_version,
                max: config.max_schema_version,
            });
        }
        let version = u32::try_from(requested).map_err(GatewayError::internal)?;
        self.schema_version.store(version, Ordering::Release);
        debug!(client_id = %self.id, schema_version = version, "schema version negotiated");
        Ok(())
    }

    /// Queue the state snapshot and start event delivery.
    ///
    /// Waits for queue space first, like any other reply. The snapshot is
    /// then taken, queued and the subscription armed under the registry's
    /// delivery gate, so no concurrently published event is missed or
    /// delivered twice: events up to the snapshot's sequence number are part
    /// of the state, later ones are forwarded after the reply.
    async fn start_listening(&self, manager: &ConnectionManager, message_id: &str) -> Result<(), GatewayError> {
        let permit = self
            .tx
            .reserve()
            .await
            .map_err(|err| GatewayError::internal(format!("unable to queue state snapshot: {err}")))?;
        let schema_version = self.schema_version();
        manager.registry().gated(|| {
            let snapshot = manager.controller().state_snapshot(schema_version);
            let reply = OutgoingMessage::Result(ResultMessage::success(
                message_id,
                json!({ "state": snapshot.state }),
            ));
            let payload = codec::encode(&reply).map_err(GatewayError::internal)?;
            permit.send(OutboundFrame::Text {
                payload,
                compress: true,
            });
            self.mark_listening(snapshot.last_event_seq);
            debug!(client_id = %self.id, after = snapshot.last_event_seq, "client listening for events");
            Ok(())
        })
    }

    async fn reply(&self, message: &OutgoingMessage) {
        if !self.is_connected() {
            return;
        }
        let payload = match codec::encode(message) {
            Ok(payload) => payload,
            Err(err) => {
                error!(client_id = %self.id, error = %err, "failed to encode reply");
                return;
            }
        };
        let frame = OutboundFrame::Text {
            payload,
            compress: false,
        };
        if self.tx.send(frame).await.is_err() {
            debug!(client_id = %self.id, "connection closed before reply was sent");
        }
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("id", &self.id)
            .field("connected", &self.is_connected())
            .field("schema_version", &self.schema_version())
            .field("receive_events", &self.receives_events())
            .field("receive_logs", &self.receives_logs())
            .finish_non_exhaustive()
    }
}

fn parse_client_metadata(
    message: &IncomingMessage,
) -> Result<Option<HashMap<String, String>>, GatewayError> {
    message
        .field("additionalUserAgentComponents")
        .map(|raw| {
            serde_json::from_value(raw.clone()).map_err(|_| {
                GatewayError::invalid_params(
                    "additionalUserAgentComponents must map component names to versions",
                )
            })
        })
        .transpose()
}

fn report_failure(err: &GatewayError) {
    counter!(COMMAND_ERRORS_TOTAL, "error_code" => err.code().to_string()).increment(1);
    if err.is_unclassified() {
        error!(error = %err, "unexpected error while handling command");
    } else if matches!(err, GatewayError::Controller { .. }) {
        warn!(error = %err, "controller rejected command");
    } else {
        debug!(error = %err, code = err.code(), "command failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{connect, gateway_manager, next_frame, next_json, no_frame};
    use serde_json::json;
    use wavegate_core::logs::LogLevel;

    fn frame(value: &Value) -> String {
        value.to_string()
    }

    #[tokio::test]
    async fn greeting_is_first_frame() {
        let (manager, _sim) = gateway_manager();
        let (_session, mut rx) = connect(&manager);
        let greeting = next_json(&mut rx).await;
        assert_eq!(greeting["type"], "version");
        assert_eq!(greeting["homeId"], 0xcafe);
        assert_eq!(greeting["serverVersion"], SERVER_VERSION);
        assert_eq!(greeting["minSchemaVersion"], 0);
        assert_eq!(greeting["maxSchemaVersion"], 35);
    }

    #[tokio::test]
    async fn initialize_in_range_stores_schema_and_metadata() {
        let (manager, _sim) = gateway_manager();
        let (session, mut rx) = connect(&manager);
        let _ = next_json(&mut rx).await;

        session
            .receive(&frame(&json!({
                "messageId": "1",
                "command": "initialize",
                "schemaVersion": 33,
                "additionalUserAgentComponents": {"ha": "2026.10"},
            })))
            .await;

        let reply = next_json(&mut rx).await;
        assert_eq!(reply, json!({"type": "result", "messageId": "1", "success": true, "result": {}}));
        assert_eq!(session.schema_version(), 33);
        assert_eq!(session.client_metadata()["ha"], "2026.10");
    }

    #[tokio::test]
    async fn out_of_range_schema_is_rejected_without_mutation() {
        let (manager, _sim) = gateway_manager();
        let (session, mut rx) = connect(&manager);
        let _ = next_json(&mut rx).await;

        session
            .receive(&frame(&json!({"messageId": "2", "command": "setApiSchema", "schemaVersion": 99})))
            .await;

        let reply = next_json(&mut rx).await;
        assert_eq!(reply["success"], false);
        assert_eq!(reply["errorCode"], "schemaIncompatible");
        assert_eq!(reply["args"]["schemaId"], 99);
        assert!(reply.get("message").is_none());
        assert_eq!(session.schema_version(), 0);
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn non_integer_schema_is_invalid_params() {
        let (manager, _sim) = gateway_manager();
        let (session, mut rx) = connect(&manager);
        let _ = next_json(&mut rx).await;

        session
            .receive(&frame(&json!({"messageId": "3", "command": "initialize", "schemaVersion": "5"})))
            .await;

        let reply = next_json(&mut rx).await;
        assert_eq!(reply["errorCode"], "invalidParamsPassedToCommand");
    }

    #[tokio::test]
    async fn bad_metadata_leaves_schema_untouched() {
        let (manager, _sim) = gateway_manager();
        let (session, mut rx) = connect(&manager);
        let _ = next_json(&mut rx).await;

        session
            .receive(&frame(&json!({
                "messageId": "4",
                "command": "initialize",
                "schemaVersion": 10,
                "additionalUserAgentComponents": ["not", "a", "map"],
            })))
            .await;

        let reply = next_json(&mut rx).await;
        assert_eq!(reply["errorCode"], "invalidParamsPassedToCommand");
        assert_eq!(session.schema_version(), 0);
    }

    #[tokio::test]
    async fn malformed_frame_closes_without_reply() {
        let (manager, _sim) = gateway_manager();
        let (session, mut rx) = connect(&manager);
        let _ = next_json(&mut rx).await;

        session.receive("{\"command\": \"initialize\"}").await;

        assert!(!session.is_connected());
        assert!(session.closed().is_cancelled());
        no_frame(&mut rx);
    }

    #[tokio::test]
    async fn unknown_command() {
        let (manager, _sim) = gateway_manager();
        let (session, mut rx) = connect(&manager);
        let _ = next_json(&mut rx).await;

        session
            .receive(&frame(&json!({"messageId": "5", "command": "frobnicate"})))
            .await;

        let reply = next_json(&mut rx).await;
        assert_eq!(reply["errorCode"], "unknownCommand");
        assert_eq!(reply["args"]["command"], "frobnicate");
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn error_message_included_from_schema_32() {
        let (manager, _sim) = gateway_manager();
        let (session, mut rx) = connect(&manager);
        let _ = next_json(&mut rx).await;

        session
            .receive(&frame(&json!({"messageId": "6", "command": "setApiSchema", "schemaVersion": 32})))
            .await;
        let _ = next_json(&mut rx).await;
        session
            .receive(&frame(&json!({"messageId": "7", "command": "node.get_state", "nodeId": 99})))
            .await;

        let reply = next_json(&mut rx).await;
        assert_eq!(reply["errorCode"], "nodeNotFound");
        assert_eq!(reply["args"]["nodeId"], 99);
        assert_eq!(reply["message"], "Node 99 not found");
    }

    #[tokio::test]
    async fn controller_error_shape() {
        let (manager, _sim) = gateway_manager();
        let (session, mut rx) = connect(&manager);
        let _ = next_json(&mut rx).await;

        for id in ["a", "b"] {
            session
                .receive(&frame(&json!({"messageId": id, "command": "controller.begin_inclusion"})))
                .await;
        }
        let first = next_json(&mut rx).await;
        assert_eq!(first["success"], true);
        let second = next_json(&mut rx).await;
        assert_eq!(second["errorCode"], "zwaveError");
        assert_eq!(second["zwaveErrorCode"], wavegate_core::sim::INCLUSION_BUSY);
        assert!(second.get("args").is_none());
    }

    #[tokio::test]
    async fn start_listening_replies_with_state_then_events() {
        let (manager, sim) = gateway_manager();
        let _ = sim.add_node(2, Some("hall"));
        let (session, mut rx) = connect(&manager);
        let _ = next_json(&mut rx).await;

        session
            .receive(&frame(&json!({"messageId": "8", "command": "startListening"})))
            .await;

        match next_frame(&mut rx).await {
            OutboundFrame::Text { payload, compress } => {
                assert!(compress);
                let reply: Value = serde_json::from_str(&payload).unwrap();
                assert_eq!(reply["messageId"], "8");
                assert_eq!(reply["result"]["state"]["nodes"][0]["name"], "hall");
            }
            OutboundFrame::Ping => panic!("expected snapshot"),
        }
        assert!(session.receives_events());
        assert!(!session.wants_event(1));
        assert!(session.wants_event(2));

        let _ = sim.add_node(3, None);
        let event = next_json(&mut rx).await;
        assert_eq!(event["type"], "event");
        assert_eq!(event["event"]["event"], "node added");
        assert_eq!(event["event"]["node"]["nodeId"], 3);
    }

    #[tokio::test]
    async fn start_listening_waits_for_queue_space() {
        let (manager, sim) = gateway_manager();
        let _ = sim.add_node(7, None);
        let (tx, mut rx) = mpsc::channel(1);
        // the greeting takes the only slot
        let session = manager.add_session(tx);

        let pending = {
            let session = session.clone();
            tokio::spawn(async move {
                session
                    .receive(&frame(&json!({"messageId": "2", "command": "startListening"})))
                    .await;
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!session.receives_events());

        assert_eq!(next_json(&mut rx).await["type"], "version");
        let reply = next_json(&mut rx).await;
        pending.await.unwrap();

        assert_eq!(reply["messageId"], "2");
        assert_eq!(reply["success"], true);
        assert_eq!(reply["result"]["state"]["nodes"][0]["nodeId"], 7);
        assert!(session.receives_events());
    }

    #[tokio::test]
    async fn get_log_config() {
        let (manager, _sim) = gateway_manager();
        let (session, mut rx) = connect(&manager);
        let _ = next_json(&mut rx).await;

        session
            .receive(&frame(&json!({"messageId": "9", "command": "getLogConfig"})))
            .await;

        let reply = next_json(&mut rx).await;
        assert_eq!(reply["result"]["config"]["level"], "info");
    }

    #[tokio::test]
    async fn update_log_config_notifies_listeners() {
        let (manager, sim) = gateway_manager();
        let (listener, mut listener_rx) = connect(&manager);
        let (other, mut other_rx) = connect(&manager);
        let _ = next_json(&mut listener_rx).await;
        let _ = next_json(&mut other_rx).await;
        listener
            .receive(&frame(&json!({"messageId": "l", "command": "startListening"})))
            .await;
        let _ = next_json(&mut listener_rx).await;

        other
            .receive(&frame(&json!({
                "messageId": "u",
                "command": "updateLogConfig",
                "config": {"level": "debug"},
            })))
            .await;

        let reply = next_json(&mut other_rx).await;
        assert_eq!(reply["success"], true);
        assert_eq!(sim.log_config().level, LogLevel::Debug);

        let event = next_json(&mut listener_rx).await;
        assert_eq!(event["event"]["source"], "driver");
        assert_eq!(event["event"]["event"], "log config updated");
        assert_eq!(event["event"]["config"]["level"], "debug");
        no_frame(&mut other_rx);
    }

    #[tokio::test]
    async fn update_log_config_rejects_bad_payload() {
        let (manager, _sim) = gateway_manager();
        let (session, mut rx) = connect(&manager);
        let _ = next_json(&mut rx).await;

        session
            .receive(&frame(&json!({"messageId": "x", "command": "updateLogConfig", "config": {"level": 7}})))
            .await;

        let reply = next_json(&mut rx).await;
        assert_eq!(reply["errorCode"], "invalidParamsPassedToCommand");
    }

    #[tokio::test]
    async fn probe_then_pong_keeps_session() {
        let (manager, _sim) = gateway_manager();
        let (session, mut rx) = connect(&manager);
        let _ = next_json(&mut rx).await;

        assert!(session.probe_liveness());
        assert_eq!(next_frame(&mut rx).await, OutboundFrame::Ping);
        session.acknowledge_ping();
        assert!(session.probe_liveness());
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn second_probe_without_pong_terminates() {
        let (manager, _sim) = gateway_manager();
        let (session, _rx) = connect(&manager);

        assert!(session.probe_liveness());
        assert!(!session.probe_liveness());
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn fan_out_drops_when_queue_full() {
        let (tx, _rx) = mpsc::channel(1);
        let session = ClientSession::new(tx, 0, Weak::new());
        assert!(session.send_frame(Arc::from("a"), false));
        assert!(!session.send_frame(Arc::from("b"), false));
        assert_eq!(session.dropped_frames(), 1);
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn closed_queue_terminates_on_fan_out() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let session = ClientSession::new(tx, 0, Weak::new());
        assert!(!session.send_frame(Arc::from("a"), false));
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn messages_after_manager_drop_are_ignored() {
        let (tx, mut rx) = mpsc::channel(4);
        let session = Arc::new(ClientSession::new(tx, 0, Weak::new()));
        session
            .receive(&frame(&json!({"messageId": "1", "command": "getLogConfig"})))
            .await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn ids_are_unique() {
        let (tx, _rx) = mpsc::channel(1);
        let a = ClientSession::new(tx.clone(), 0, Weak::new());
        let b = ClientSession::new(tx, 0, Weak::new());
        assert_ne!(a.id(), b.id());
        assert!(a.id().starts_with("client_"));
    }
}
