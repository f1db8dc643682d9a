//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Gateway configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Port (0 = OS-assigned).
    pub port: u16,
    /// Seconds between liveness probes.
    pub heartbeat_interval_secs: u64,
    /// Lowest schema version a client may negotiate.
    pub min_schema_version: u32,
    /// Highest schema version a client may negotiate.
    pub max_schema_version: u32,
    /// Tear the gateway down after a controller hard reset instead of
    /// resuming in place.
    pub destroy_on_hard_reset: bool,
    /// Advertise the gateway through the configured service advertiser.
    pub enable_service_discovery: bool,
    /// Outbound frames buffered per client before fan-out starts dropping.
    pub send_queue_capacity: usize,
    /// Maximum inbound WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            heartbeat_interval_secs: 30,
            min_schema_version: 0,
            max_schema_version: 35,
            destroy_on_hard_reset: false,
            enable_service_discovery: false,
            send_queue_capacity: 1024,
            max_message_size: 16 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Liveness probe interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether `version` lies in the supported schema range.
    pub fn supports_schema(&self, version: i64) -> bool {
        (i64::from(self.min_schema_version)..=i64::from(self.max_schema_version)).contains(&version)
    }
}
