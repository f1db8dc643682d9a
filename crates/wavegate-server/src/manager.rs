//! Connection manager: owns the session registry, the heartbeat and the
//! event/log forwarders, and coordinates hard reset and full disconnect.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};
use wavegate_core::controller::Controller;
use wavegate_core::errors::GatewayError;
use wavegate_core::events::ControllerEvent;
use wavegate_core::logs::LogFilter;

use crate::config::ServerConfig;
use crate::forward::events::EventForwarder;
use crate::forward::logging::LoggingForwarder;
use crate::gateway::{Component, GatewayEvent};
use crate::handlers::HandlerTable;
use crate::metrics::{CLEANUP_PASSES_TOTAL, SESSIONS_ACTIVE};
use crate::websocket::heartbeat::Heartbeat;
use crate::websocket::registry::SessionRegistry;
use crate::websocket::session::{ClientSession, OutboundFrame};

/// Callbacks into the component that owns the manager.
#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    /// Tear everything down (after a hard reset with destroy enabled).
    async fn destroy(&self);
    /// The controller is ready again after a hard reset.
    async fn resume(&self);
    /// Publish a gateway notification.
    fn notify(&self, event: GatewayEvent);
}

/// Owns every client session of one gateway run.
pub struct ConnectionManager {
    weak_self: Weak<Self>,
    controller: Arc<dyn Controller>,
    config: ServerConfig,
    handlers: HandlerTable,
    registry: Arc<SessionRegistry>,
    heartbeat: Mutex<Option<Heartbeat>>,
    events: EventForwarder,
    logging: LoggingForwarder,
    cleanup_scheduled: AtomicBool,
    cleanup_passes: AtomicU64,
    hooks: Option<Arc<dyn LifecycleHooks>>,
}

impl ConnectionManager {
    /// Create a manager. Nothing runs until the first session is added.
    pub fn new(
        controller: Arc<dyn Controller>,
        config: ServerConfig,
        handlers: HandlerTable,
        hooks: Option<Arc<dyn LifecycleHooks>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| {
            let registry = Arc::new(SessionRegistry::new());
            Self {
                weak_self: weak_self.clone(),
                events: EventForwarder::new(controller.clone(), registry.clone()),
                logging: LoggingForwarder::new(controller.clone(), registry.clone()),
                controller,
                config,
                handlers,
                registry,
                heartbeat: Mutex::new(None),
                cleanup_scheduled: AtomicBool::new(false),
                cleanup_passes: AtomicU64::new(0),
                hooks,
            }
        })
    }

    /// The shared controller.
    pub fn controller(&self) -> &Arc<dyn Controller> {
        &self.controller
    }

    /// Gateway configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Handler families.
    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    /// Session registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Registered sessions.
    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Sessions receiving domain events.
    pub fn listening_session_count(&self) -> usize {
        self.registry.event_listener_count()
    }

    /// Cleanup passes run so far.
    pub fn cleanup_pass_count(&self) -> u64 {
        self.cleanup_passes.load(Ordering::Relaxed)
    }

    /// Whether the logging forwarder is running.
    pub fn logging_forwarder_running(&self) -> bool {
        self.logging.is_running()
    }

    /// Whether the event forwarder is running.
    pub fn event_forwarder_running(&self) -> bool {
        self.events.is_running()
    }

    /// Whether the heartbeat task is running.
    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat.lock().as_ref().is_some_and(Heartbeat::is_running)
    }

    /// Wrap a new connection in a session and register it.
    ///
    /// The version greeting is queued before anything else can reach the
    /// client. The heartbeat and the event forwarder start with the first
    /// session.
    pub fn add_session(&self, outbound: mpsc::Sender<OutboundFrame>) -> Arc<ClientSession> {
        let session = Arc::new(ClientSession::new(
            outbound,
            self.config.min_schema_version,
            self.weak_self.clone(),
        ));
        session.send_version(self.controller.as_ref(), &self.config);
        self.registry.add(session.clone());
        gauge!(SESSIONS_ACTIVE).set(self.registry.len() as f64);

        {
            let mut heartbeat = self.heartbeat.lock();
            if heartbeat.is_none() {
                *heartbeat = Some(Heartbeat::spawn(
                    self.weak_self.clone(),
                    self.config.heartbeat_interval(),
                ));
            }
        }
        self.events.start();

        info!(client_id = %session.id(), sessions = self.registry.len(), "client connected");
        session
    }

    /// One heartbeat tick.
    ///
    /// Connected sessions are probed; sessions already disconnected are
    /// force-closed and dropped from the registry right away.
    pub fn heartbeat_tick(&self) {
        let removed = self.registry.retain(|session| {
            if session.is_connected() {
                let _ = session.probe_liveness();
                true
            } else {
                session.terminate();
                false
            }
        });
        if !removed.is_empty() {
            debug!(removed = removed.len(), "heartbeat dropped closed sessions");
            gauge!(SESSIONS_ACTIVE).set(self.registry.len() as f64);
            self.cleanup_logging_forwarder();
        }
    }

    /// A session's transport closed.
    ///
    /// Schedules one cleanup pass for the next scheduler turn; further
    /// closes before it runs are folded into the same pass.
    pub fn on_session_closed(&self) {
        if self
            .cleanup_scheduled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let manager = self.weak_self.clone();
        drop(tokio::spawn(async move {
            tokio::task::yield_now().await;
            if let Some(manager) = manager.upgrade() {
                manager.cleanup_sessions();
            }
        }));
    }

    /// Drop disconnected sessions and re-check the logging forwarder.
    pub fn cleanup_sessions(&self) {
        self.cleanup_scheduled.store(false, Ordering::Release);
        let removed = self.registry.retain(|session| session.is_connected());
        let _ = self.cleanup_passes.fetch_add(1, Ordering::Relaxed);
        counter!(CLEANUP_PASSES_TOTAL).increment(1);
        gauge!(SESSIONS_ACTIVE).set(self.registry.len() as f64);
        debug!(
            removed = removed.len(),
            remaining = self.registry.len(),
            "session cleanup pass"
        );
        self.cleanup_logging_forwarder();
    }

    /// Start the logging forwarder with `filter` unless it already runs.
    pub fn configure_logging(&self, filter: Option<LogFilter>) {
        let _ = self.logging.start(filter);
    }

    /// Re-apply the controller's log settings to a running forwarder.
    pub fn restart_logging_if_needed(&self) {
        self.logging.restart_if_needed();
    }

    /// Stop the logging forwarder once no session listens to logs.
    pub fn cleanup_logging_forwarder(&self) {
        if self.logging.is_running() && self.registry.log_listener_count() == 0 {
            self.logging.stop();
        }
    }

    /// Send a gateway-originated event to every event listener.
    pub fn broadcast_driver_event(&self, event: &ControllerEvent) {
        let delivered = self.registry.broadcast_to_listeners(event);
        debug!(event = %event.event, delivered, "driver event broadcast");
    }

    /// Hard-reset the shared controller.
    ///
    /// Afterwards the gateway is either destroyed (`destroy_on_hard_reset`)
    /// or resumed once the controller reports ready, with the forwarders
    /// resubscribed. Sessions are not notified individually.
    #[instrument(skip_all)]
    pub async fn hard_reset(&self) -> Result<(), GatewayError> {
        let mut readiness = self.controller.readiness();
        let _ = readiness.borrow_and_update();
        info!("hard reset requested");

        if let Err(err) = self.controller.hard_reset().await {
            error!(error = %err, "hard reset failed");
            self.notify(GatewayEvent::Error {
                component: Component::Controller,
                message: err.to_string(),
            });
            return Err(err.into());
        }

        if self.config.destroy_on_hard_reset {
            info!("hard reset complete, destroying gateway");
            match &self.hooks {
                Some(hooks) => {
                    hooks.destroy().await;
                    hooks.notify(GatewayEvent::HardReset);
                }
                None => self.disconnect(),
            }
            return Ok(());
        }

        readiness
            .wait_for(|ready| *ready)
            .await
            .map(|_| ())
            .map_err(|_| GatewayError::internal("controller readiness channel closed"))?;
        self.events.restart();
        self.logging.restart_if_needed();
        if let Some(hooks) = &self.hooks {
            hooks.resume().await;
        }
        info!("hard reset complete, gateway resumed");
        Ok(())
    }

    /// Stop the heartbeat, force-close every session, empty the registry
    /// and stop the forwarders. Idempotent.
    pub fn disconnect(&self) {
        if let Some(heartbeat) = self.heartbeat.lock().take() {
            heartbeat.stop();
        }
        let sessions = self.registry.drain();
        for session in &sessions {
            session.terminate();
        }
        self.logging.stop();
        self.events.stop();
        gauge!(SESSIONS_ACTIVE).set(0.0);
        if !sessions.is_empty() {
            info!(closed = sessions.len(), "all clients disconnected");
        }
    }

    fn notify(&self, event: GatewayEvent) {
        if let Some(hooks) = &self.hooks {
            hooks.notify(event);
        }
    }
}
