//! Client and server message types.
//!
//! Wire format (all JSON text frames):
//! - client → server: `{"messageId", "command", ...fields}`
//! - greeting: `{"type": "version", ...}`
//! - replies: `{"type": "result", "messageId", "success", ...}`
//! - events: `{"type": "event", "event": {...}}`

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use wavegate_core::errors::{CONTROLLER_ERROR, GatewayError};

/// First schema version whose error replies carry a `message` field.
pub const ERROR_MESSAGE_SCHEMA: u32 = 32;

/// Message sent by a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    /// Client-chosen correlation id, echoed in the reply.
    pub message_id: String,
    /// Command name, either built-in or `<namespace>.<verb>`.
    pub command: String,
    /// Every other field of the message.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl IncomingMessage {
    /// A field by name.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// Unsolicited greeting sent on connect.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    /// Controller driver version.
    pub driver_version: String,
    /// Gateway version.
    pub server_version: String,
    /// Network home id, `null` when unknown.
    pub home_id: Option<u32>,
    /// Lowest supported schema version.
    pub min_schema_version: u32,
    /// Highest supported schema version.
    pub max_schema_version: u32,
}

/// Reply to a single client message.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMessage {
    /// Correlation id of the request.
    pub message_id: String,
    /// Whether the command succeeded.
    pub success: bool,
    /// Result or error fields.
    #[serde(flatten)]
    pub body: ResultBody,
}

/// Payload of a [`ResultMessage`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResultBody {
    /// Successful result document.
    Success {
        /// Result document.
        result: Value,
    },
    /// Failure raised by the controller with its own numeric code.
    Controller {
        /// Always [`CONTROLLER_ERROR`].
        #[serde(rename = "errorCode")]
        error_code: String,
        /// Controller-specific numeric code.
        #[serde(rename = "zwaveErrorCode")]
        zwave_error_code: i64,
        /// Controller message.
        #[serde(rename = "zwaveErrorMessage")]
        zwave_error_message: String,
    },
    /// Any other failure.
    Error {
        /// Wire error code.
        #[serde(rename = "errorCode")]
        error_code: String,
        /// Human-readable message (schema 32 and later).
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        /// Structured arguments.
        args: Map<String, Value>,
    },
}

impl ResultMessage {
    /// Successful reply.
    pub fn success(message_id: &str, result: Value) -> Self {
        Self {
            message_id: message_id.to_string(),
            success: true,
            body: ResultBody::Success { result },
        }
    }

    /// Error reply shaped for a client speaking `schema_version`.
    ///
    /// Unclassified failures never carry detail.
    pub fn failure(message_id: &str, err: &GatewayError, schema_version: u32) -> Self {
        let with_message = schema_version >= ERROR_MESSAGE_SCHEMA;
        let body = match err {
            GatewayError::Controller { code, message } => ResultBody::Controller {
                error_code: CONTROLLER_ERROR.to_string(),
                zwave_error_code: *code,
                zwave_error_message: message.clone(),
            },
            _ if err.is_unclassified() => ResultBody::Error {
                error_code: err.code().to_string(),
                message: with_message.then(|| "An unknown error occurred".to_string()),
                args: Map::new(),
            },
            _ => ResultBody::Error {
                error_code: err.code().to_string(),
                message: with_message.then(|| err.to_string()),
                args: err.args(),
            },
        };
        Self {
            message_id: message_id.to_string(),
            success: false,
            body,
        }
    }
}

/// Message sent by the gateway.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutgoingMessage {
    /// Connection greeting.
    Version(VersionInfo),
    /// Reply to a client message.
    Result(ResultMessage),
    /// Domain event or log record.
    Event {
        /// Event body (`source`, `event`, payload).
        event: Value,
    },
}
