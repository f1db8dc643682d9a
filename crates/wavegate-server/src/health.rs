//! `/health` report: controller readiness plus session counts.

use std::time::Instant;

use serde::Serialize;

use crate::manager::ConnectionManager;

/// Overall gateway condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Serving and the controller is ready.
    Ok,
    /// Serving, but the controller is resetting or not yet ready.
    Degraded,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Overall condition.
    pub status: HealthStatus,
    /// Seconds since the gateway started.
    pub uptime_secs: u64,
    /// Whether the controller accepts commands.
    pub controller_ready: bool,
    /// Network home id, if known.
    pub home_id: Option<u32>,
    /// Registered client sessions.
    pub connections: usize,
    /// Sessions receiving domain events.
    pub listening_sessions: usize,
    /// Sessions receiving controller logs.
    pub log_listeners: usize,
}

impl HealthReport {
    /// Snapshot the manager's controller and sessions.
    pub fn collect(manager: &ConnectionManager, started: Instant) -> Self {
        let controller = manager.controller();
        let controller_ready = controller.is_ready();
        let registry = manager.registry();
        Self {
            status: if controller_ready {
                HealthStatus::Ok
            } else {
                HealthStatus::Degraded
            },
            uptime_secs: started.elapsed().as_secs(),
            controller_ready,
            home_id: controller.home_id(),
            connections: registry.len(),
            listening_sessions: registry.event_listener_count(),
            log_listeners: registry.log_listener_count(),
        }
    }
}
