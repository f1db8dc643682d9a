//! In-memory [`Controller`] used by tests and the demo binary.
//!
//! Holds a small node table, assigns sequence numbers to every published
//! event under the same lock that guards the state, and models a hard reset
//! by dropping readiness, swapping the event stream and bumping the home id.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::controller::{CommandRequest, Controller, StateSnapshot};
use crate::errors::ControllerError;
use crate::events::{ControllerEvent, EventSource};
use crate::logs::{LogConfig, LogConfigUpdate, LogLevel, LogRecord};

/// Driver version reported by the simulator.
pub const SIM_DRIVER_VERSION: &str = "15.0.0-sim";

/// Controller error code returned when inclusion is already running.
pub const INCLUSION_BUSY: i64 = 204;

const EVENT_CAPACITY: usize = 256;
const LOG_CAPACITY: usize = 256;

/// A node known to the simulator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimNode {
    /// Node id.
    pub node_id: u32,
    /// User-assigned name.
    pub name: Option<String>,
    /// User-assigned location.
    pub location: Option<String>,
}

struct SimState {
    home_id: u32,
    nodes: BTreeMap<u32, SimNode>,
    last_seq: u64,
    inclusion_active: bool,
    log_config: LogConfig,
    events: broadcast::Sender<ControllerEvent>,
    hard_reset_failure: Option<String>,
}

impl SimState {
    fn publish(&mut self, mut event: ControllerEvent) -> u64 {
        self.last_seq += 1;
        event.seq = self.last_seq;
        // no subscribers is fine
        let _ = self.events.send(event);
        self.last_seq
    }

    fn node(&self, node_id: u32) -> Result<&SimNode, ControllerError> {
        self.nodes
            .get(&node_id)
            .ok_or_else(|| ControllerError::node_not_found(u64::from(node_id)))
    }
}

/// In-memory controller.
pub struct SimulatedController {
    state: Mutex<SimState>,
    logs: broadcast::Sender<LogRecord>,
    ready: watch::Sender<bool>,
}

impl SimulatedController {
    /// A ready controller with the given home id and no nodes.
    pub fn new(home_id: u32) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (logs, _) = broadcast::channel(LOG_CAPACITY);
        let (ready, _) = watch::channel(true);
        Self {
            state: Mutex::new(SimState {
                home_id,
                nodes: BTreeMap::new(),
                last_seq: 0,
                inclusion_active: false,
                log_config: LogConfig::default(),
                events,
                hard_reset_failure: None,
            }),
            logs,
            ready,
        }
    }

    /// Flip readiness.
    pub fn set_ready(&self, ready: bool) {
        let _ = self.ready.send_replace(ready);
    }

    /// Make the next hard reset fail with `message`.
    pub fn fail_next_hard_reset(&self, message: impl Into<String>) {
        self.state.lock().hard_reset_failure = Some(message.into());
    }

    /// Add a node and publish `node added`.
    pub fn add_node(&self, node_id: u32, name: Option<&str>) -> u64 {
        let node = SimNode {
            node_id,
            name: name.map(str::to_string),
            location: None,
        };
        let mut state = self.state.lock();
        let payload = json!(node);
        let _ = state.nodes.insert(node_id, node);
        state.publish(ControllerEvent::new(EventSource::Controller, "node added").with("node", payload))
    }

    /// Remove a node and publish `node removed`.
    pub fn remove_node(&self, node_id: u32) -> Option<u64> {
        let mut state = self.state.lock();
        let node = state.nodes.remove(&node_id)?;
        Some(state.publish(
            ControllerEvent::new(EventSource::Controller, "node removed").with("node", json!(node)),
        ))
    }

    /// Publish an arbitrary event, returning its sequence number.
    pub fn emit(&self, event: ControllerEvent) -> u64 {
        self.state.lock().publish(event)
    }

    /// Emit a log record if logging is enabled at its level.
    pub fn log(&self, record: LogRecord) {
        let config = self.state.lock().log_config.clone();
        if config.enabled && record.level >= config.level {
            let _ = self.logs.send(record);
        }
    }

    /// Number of known nodes.
    pub fn node_count(&self) -> usize {
        self.state.lock().nodes.len()
    }

    /// Sequence number of the newest published event.
    pub fn last_event_seq(&self) -> u64 {
        self.state.lock().last_seq
    }
}

fn node_id_arg(args: &Map<String, Value>) -> Result<u32, ControllerError> {
    args.get("nodeId")
        .and_then(Value::as_u64)
        .and_then(|id| u32::try_from(id).ok())
        .ok_or_else(|| ControllerError::invalid_params("nodeId must be a positive integer"))
}

fn string_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str, ControllerError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ControllerError::invalid_params(format!("{key} must be a string")))
}

fn controller_state(state: &SimState) -> Value {
    json!({
        "homeId": state.home_id,
        "inclusionActive": state.inclusion_active,
    })
}

#[async_trait]
impl Controller for SimulatedController {
    fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    fn readiness(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }

    fn home_id(&self) -> Option<u32> {
        Some(self.state.lock().home_id)
    }

    fn driver_version(&self) -> String {
        SIM_DRIVER_VERSION.to_string()
    }

    fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.state.lock().events.subscribe()
    }

    fn subscribe_logs(&self) -> broadcast::Receiver<LogRecord> {
        self.logs.subscribe()
    }

    fn state_snapshot(&self, _schema_version: u32) -> StateSnapshot {
        let state = self.state.lock();
        let nodes: Vec<&SimNode> = state.nodes.values().collect();
        StateSnapshot {
            state: json!({
                "driver": { "logConfig": state.log_config },
                "controller": controller_state(&state),
                "nodes": nodes,
            }),
            last_event_seq: state.last_seq,
        }
    }

    fn log_config(&self) -> LogConfig {
        self.state.lock().log_config.clone()
    }

    fn update_log_config(&self, update: LogConfigUpdate) -> Result<(), ControllerError> {
        let mut state = self.state.lock();
        state.log_config.apply(update);
        debug!(level = %state.log_config.level, "log config updated");
        Ok(())
    }

    async fn execute(&self, request: CommandRequest<'_>) -> Result<Value, ControllerError> {
        self.run_command(request)
    }

    async fn hard_reset(&self) -> Result<(), ControllerError> {
        let failure = self.state.lock().hard_reset_failure.take();
        if let Some(message) = failure {
            return Err(ControllerError::Other(message));
        }

        self.set_ready(false);
        let old_events = {
            let mut state = self.state.lock();
            state.nodes.clear();
            state.inclusion_active = false;
            state.home_id = state.home_id.wrapping_add(1);
            let (events, _) = broadcast::channel(EVENT_CAPACITY);
            std::mem::replace(&mut state.events, events)
        };
        // closes the stream for existing subscribers
        drop(old_events);

        self.log(LogRecord::now(LogLevel::Info, "DRIVER", "controller was hard reset"));
        tokio::task::yield_now().await;
        self.set_ready(true);
        Ok(())
    }
}

impl SimulatedController {
    fn run_command(&self, request: CommandRequest<'_>) -> Result<Value, ControllerError> {
        let args = request.args;
        let mut state = self.state.lock();
        match (request.namespace, request.verb) {
            ("driver", "get_config") => Ok(json!({
                "config": { "logConfig": state.log_config, "homeId": state.home_id },
            })),
            ("controller", "get_state") => Ok(json!({ "state": controller_state(&state) })),
            ("controller", "begin_inclusion") => {
                if state.inclusion_active {
                    return Err(ControllerError::Domain {
                        code: INCLUSION_BUSY,
                        message: "inclusion is already in progress".into(),
                    });
                }
                state.inclusion_active = true;
                let _ = state.publish(ControllerEvent::new(EventSource::Controller, "inclusion started"));
                Ok(json!({ "success": true }))
            }
            ("controller", "stop_inclusion") => {
                let was_active = std::mem::replace(&mut state.inclusion_active, false);
                if was_active {
                    let _ = state.publish(ControllerEvent::new(EventSource::Controller, "inclusion stopped"));
                }
                Ok(json!({ "success": was_active }))
            }
            ("controller", "remove_node_from_all_associations") => {
                let node_id = node_id_arg(args)?;
                let _ = state.node(node_id)?;
                Ok(json!({}))
            }
            ("node", "get_state") => {
                let node_id = node_id_arg(args)?;
                Ok(json!({ "state": state.node(node_id)? }))
            }
            ("node", "set_name") => {
                let node_id = node_id_arg(args)?;
                let name = string_arg(args, "name")?.to_string();
                let _ = state.node(node_id)?;
                if let Some(node) = state.nodes.get_mut(&node_id) {
                    node.name = Some(name.clone());
                }
                let _ = state.publish(
                    ControllerEvent::new(EventSource::Node, "name changed")
                        .with("nodeId", node_id)
                        .with("name", name),
                );
                Ok(json!({}))
            }
            ("node", "set_location") => {
                let node_id = node_id_arg(args)?;
                let location = string_arg(args, "location")?.to_string();
                let _ = state.node(node_id)?;
                if let Some(node) = state.nodes.get_mut(&node_id) {
                    node.location = Some(location);
                }
                Ok(json!({}))
            }
            ("utils", "ping") => Ok(json!({ "pong": true })),
            ("utils", "num2hex") => {
                let value = args
                    .get("val")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| ControllerError::invalid_params("val must be a number"))?;
                Ok(json!({ "hex": format!("0x{value:02x}") }))
            }
            (namespace, verb) => Err(ControllerError::unknown_command(&format!("{namespace}.{verb}"))),
        }
    }
}
