//! Domain events published by the controller.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which part of the controller emitted an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    /// The controller node itself (inclusion, exclusion, network state).
    Controller,
    /// The driver process (log config, readiness).
    Driver,
    /// An individual node.
    Node,
}

/// A domain event.
///
/// Serializes to the event body sent to clients: `source`, `event`, then the
/// payload fields flattened alongside. `seq` is assigned by the controller in
/// publish order and never leaves the process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControllerEvent {
    /// Publish-order sequence number, strictly increasing per controller.
    #[serde(skip)]
    pub seq: u64,
    /// Emitting component.
    pub source: EventSource,
    /// Event name, e.g. `"node added"`.
    pub event: String,
    /// Event payload.
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl ControllerEvent {
    /// New event with an empty payload and no sequence number yet.
    pub fn new(source: EventSource, event: impl Into<String>) -> Self {
        Self {
            seq: 0,
            source,
            event: event.into(),
            data: Map::new(),
        }
    }

    /// Add a payload field.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        let _ = self.data.insert(key.to_string(), value.into());
        self
    }
}
