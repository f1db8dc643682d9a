//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Fails if a recorder is
/// already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Registered client sessions (gauge).
pub const SESSIONS_ACTIVE: &str = "sessions_active";
/// Commands handled total (counter, labels: namespace).
pub const COMMANDS_TOTAL: &str = "commands_total";
/// Command failures total (counter, labels: `error_code`).
pub const COMMAND_ERRORS_TOTAL: &str = "command_errors_total";
/// Command handling duration seconds (histogram, labels: namespace).
pub const COMMAND_DURATION_SECONDS: &str = "command_duration_seconds";
/// Sessions force-closed by the heartbeat (counter).
pub const HEARTBEAT_TERMINATIONS_TOTAL: &str = "heartbeat_terminations_total";
/// Coalesced cleanup passes run (counter).
pub const CLEANUP_PASSES_TOTAL: &str = "cleanup_passes_total";
/// Domain events delivered to sessions (counter).
pub const EVENTS_FORWARDED_TOTAL: &str = "events_forwarded_total";
/// Log records delivered to sessions (counter).
pub const LOGS_FORWARDED_TOTAL: &str = "logs_forwarded_total";
/// Fan-out frames dropped because a client queue was full or closed (counter).
pub const FANOUT_DROPS_TOTAL: &str = "fanout_drops_total";
