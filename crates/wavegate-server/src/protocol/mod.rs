//! Wire protocol: message types, JSON codec and command routing.

pub mod codec;
pub mod messages;
pub mod router;

/// Top-level commands handled by the session itself.
pub mod commands {
    /// Negotiate the schema version and register client metadata.
    pub const INITIALIZE: &str = "initialize";
    /// Change the schema version.
    pub const SET_API_SCHEMA: &str = "setApiSchema";
    /// Snapshot the state and subscribe to domain events.
    pub const START_LISTENING: &str = "startListening";
    /// Read the controller log configuration.
    pub const GET_LOG_CONFIG: &str = "getLogConfig";
    /// Update the controller log configuration.
    pub const UPDATE_LOG_CONFIG: &str = "updateLogConfig";
}
