//! The boundary to the shared device controller.
//!
//! The gateway owns exactly one [`Controller`] and shares it between every
//! client session. Everything the gateway needs from the controller goes
//! through this trait: identity, readiness, the event and log streams, state
//! snapshots, log configuration, command execution and hard reset.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, watch};

use crate::errors::ControllerError;
use crate::events::ControllerEvent;
use crate::logs::{LogConfig, LogConfigUpdate, LogRecord};

/// Serialized controller state plus the last event it already reflects.
#[derive(Clone, Debug, PartialEq)]
pub struct StateSnapshot {
    /// State document returned to `startListening`.
    pub state: Value,
    /// Sequence number of the newest event folded into `state`.
    pub last_event_seq: u64,
}

/// A namespaced command forwarded to the controller.
#[derive(Clone, Copy, Debug)]
pub struct CommandRequest<'a> {
    /// Namespace prefix, e.g. `"node"`.
    pub namespace: &'a str,
    /// Verb after the namespace, e.g. `"set_name"`.
    pub verb: &'a str,
    /// Every message field other than `messageId` and `command`.
    pub args: &'a Map<String, Value>,
    /// Schema version negotiated by the calling client.
    pub schema_version: u32,
}

/// Shared device controller.
#[async_trait]
pub trait Controller: Send + Sync {
    /// Whether the controller can currently serve requests.
    fn is_ready(&self) -> bool;

    /// Readiness signal. Goes `false` while a hard reset is in flight and
    /// back to `true` once the controller is usable again.
    fn readiness(&self) -> watch::Receiver<bool>;

    /// Network home id, if known.
    fn home_id(&self) -> Option<u32>;

    /// Version string of the underlying driver.
    fn driver_version(&self) -> String;

    /// Subscribe to domain events. The stream closes when the controller is
    /// torn down (for example by a hard reset); subscribe again afterwards.
    fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent>;

    /// Subscribe to controller log records.
    fn subscribe_logs(&self) -> broadcast::Receiver<LogRecord>;

    /// Snapshot the state for a client speaking `schema_version`.
    ///
    /// `last_event_seq` must be taken atomically with `state`: every event
    /// with a greater sequence number is not yet reflected in it.
    fn state_snapshot(&self, schema_version: u32) -> StateSnapshot;

    /// Current log configuration.
    fn log_config(&self) -> LogConfig;

    /// Apply a partial log configuration update.
    fn update_log_config(&self, update: LogConfigUpdate) -> Result<(), ControllerError>;

    /// Execute a namespaced command and return its result document.
    async fn execute(&self, request: CommandRequest<'_>) -> Result<Value, ControllerError>;

    /// Hard-reset the controller.
    ///
    /// Readiness must already be `false` when this resolves, unless the
    /// controller is ready again by then.
    async fn hard_reset(&self) -> Result<(), ControllerError>;
}
