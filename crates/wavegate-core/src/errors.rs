//! Error codes and error types shared across the gateway.
//!
//! Every failure that reaches a client is reduced to one of the string codes
//! below. Controller failures carry their own numeric code and are reported
//! with the [`CONTROLLER_ERROR`] shape instead.

use serde_json::{Map, Value};

/// Unclassified failure. No detail is sent to the client.
pub const UNKNOWN_ERROR: &str = "unknownError";
/// No handler family matched the command.
pub const UNKNOWN_COMMAND: &str = "unknownCommand";
/// Requested schema version is outside the supported range.
pub const SCHEMA_INCOMPATIBLE: &str = "schemaIncompatible";
/// Failure raised by the controller with its own numeric code.
pub const CONTROLLER_ERROR: &str = "zwaveError";
/// A command field was missing or had the wrong type.
pub const INVALID_PARAMS: &str = "invalidParamsPassedToCommand";
/// The command referenced a node the controller does not know.
pub const NODE_NOT_FOUND: &str = "nodeNotFound";
/// The controller is not ready to serve commands.
pub const CONTROLLER_NOT_READY: &str = "controllerNotReady";

/// Failures reported by a [`Controller`](crate::controller::Controller).
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// Failure from the controller itself, with its numeric error code.
    #[error("{message} (code {code})")]
    Domain {
        /// Controller-specific numeric code.
        code: i64,
        /// Human-readable message.
        message: String,
    },
    /// Known failure with a stable string code and structured arguments.
    #[error("{message}")]
    Coded {
        /// Wire error code.
        code: String,
        /// Human-readable message.
        message: String,
        /// Structured arguments forwarded to the client verbatim.
        args: Map<String, Value>,
    },
    /// The controller cannot serve requests right now.
    #[error("controller is not ready")]
    NotReady,
    /// Anything else.
    #[error("{0}")]
    Other(String),
}

impl ControllerError {
    /// Shorthand for a [`ControllerError::Coded`] failure.
    pub fn coded(code: &str, message: impl Into<String>, args: Map<String, Value>) -> Self {
        Self::Coded {
            code: code.to_string(),
            message: message.into(),
            args,
        }
    }

    /// The node with the given id does not exist.
    pub fn node_not_found(node_id: u64) -> Self {
        let mut args = Map::new();
        let _ = args.insert("nodeId".into(), Value::from(node_id));
        Self::coded(NODE_NOT_FOUND, format!("Node {node_id} not found"), args)
    }

    /// The command verb is not supported by the controller.
    pub fn unknown_command(command: &str) -> Self {
        let mut args = Map::new();
        let _ = args.insert("command".into(), Value::from(command));
        Self::coded(UNKNOWN_COMMAND, format!("Unknown command {command}"), args)
    }

    /// A command argument was missing or malformed.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::coded(INVALID_PARAMS, message, Map::new())
    }
}

/// Failures raised while handling client traffic or running the gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Requested schema version is outside `[min, max]`.
    #[error("schema version {requested} is not supported (supported: {min}..={max})")]
    SchemaIncompatible {
        /// Version the client asked for.
        requested: i64,
        /// Lowest supported version.
        min: u32,
        /// Highest supported version.
        max: u32,
    },
    /// No handler family owns the command.
    #[error("unknown command {command}")]
    UnknownCommand {
        /// The command as received.
        command: String,
    },
    /// A command field was missing or malformed.
    #[error("{message}")]
    InvalidParams {
        /// What was wrong.
        message: String,
    },
    /// Known failure with a stable string code.
    #[error("{message}")]
    Coded {
        /// Wire error code.
        code: String,
        /// Human-readable message.
        message: String,
        /// Structured arguments forwarded verbatim.
        args: Map<String, Value>,
    },
    /// Failure raised by the controller with its own numeric code.
    #[error("{message}")]
    Controller {
        /// Controller-specific numeric code.
        code: i64,
        /// Human-readable message.
        message: String,
    },
    /// The controller is not ready.
    #[error("controller is not ready")]
    NotReady,
    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that failed.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Unclassified internal failure.
    #[error("{message}")]
    Internal {
        /// Detail, logged but never sent to clients.
        message: String,
    },
}

impl GatewayError {
    /// Wrap any displayable failure as [`GatewayError::Internal`].
    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal {
            message: err.to_string(),
        }
    }

    /// Shorthand for [`GatewayError::InvalidParams`].
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Wire error code for this failure.
    pub fn code(&self) -> &str {
        match self {
            Self::SchemaIncompatible { .. } => SCHEMA_INCOMPATIBLE,
            Self::UnknownCommand { .. } => UNKNOWN_COMMAND,
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::Coded { code, .. } => code.as_str(),
            Self::Controller { .. } => CONTROLLER_ERROR,
            Self::NotReady => CONTROLLER_NOT_READY,
            Self::Bind { .. } | Self::Internal { .. } => UNKNOWN_ERROR,
        }
    }

    /// Structured arguments sent alongside the code.
    pub fn args(&self) -> Map<String, Value> {
        let mut args = Map::new();
        match self {
            Self::SchemaIncompatible { requested, .. } => {
                let _ = args.insert("schemaId".into(), Value::from(*requested));
            }
            Self::UnknownCommand { command } => {
                let _ = args.insert("command".into(), Value::from(command.as_str()));
            }
            Self::Coded { args: coded, .. } => return coded.clone(),
            _ => {}
        }
        args
    }

    /// Whether the failure is unclassified and must not leak detail.
    pub fn is_unclassified(&self) -> bool {
        matches!(self, Self::Bind { .. } | Self::Internal { .. })
    }
}

impl From<ControllerError> for GatewayError {
    fn from(err: ControllerError) -> Self {
        match err {
            ControllerError::Domain { code, message } => Self::Controller { code, message },
            ControllerError::Coded {
                code,
                message,
                args,
            } => Self::Coded {
                code,
                message,
                args,
            },
            ControllerError::NotReady => Self::NotReady,
            ControllerError::Other(message) => Self::Internal { message },
        }
    }
}
