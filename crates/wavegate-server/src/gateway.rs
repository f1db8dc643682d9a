//! Gateway lifecycle: bind, serve, advertise, resume and destroy.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use wavegate_core::controller::Controller;
use wavegate_core::errors::GatewayError;

use crate::config::ServerConfig;
use crate::discovery::{Advertisement, ServiceAdvertiser, ServiceInfo};
use crate::handlers::HandlerTable;
use crate::manager::{ConnectionManager, LifecycleHooks};
use crate::server::{AppState, build_router};

/// How long `destroy` waits for the HTTP server to wind down.
const SERVER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

const NOTIFICATION_CAPACITY: usize = 64;

/// Part of the gateway a notification refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Component {
    /// HTTP listener and router.
    HttpServer,
    /// WebSocket upgrade and transport.
    WebSocket,
    /// Service advertisement.
    Discovery,
    /// The shared controller.
    Controller,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HttpServer => write!(f, "http-server"),
            Self::WebSocket => write!(f, "websocket"),
            Self::Discovery => write!(f, "discovery"),
            Self::Controller => write!(f, "controller"),
        }
    }
}

/// Notifications published by a running gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayEvent {
    /// The listener is bound.
    Listening {
        /// Bound address.
        addr: SocketAddr,
    },
    /// A sub-component failed.
    Error {
        /// Failing component.
        component: Component,
        /// Failure description.
        message: String,
    },
    /// The gateway was destroyed after a controller hard reset.
    HardReset,
}

/// Configures a [`Gateway`].
pub struct GatewayBuilder {
    controller: Arc<dyn Controller>,
    config: ServerConfig,
    handlers: HandlerTable,
    advertiser: Option<Arc<dyn ServiceAdvertiser>>,
    metrics: Option<PrometheusHandle>,
}

impl GatewayBuilder {
    /// Replace the command handler families.
    #[must_use]
    pub fn with_handlers(mut self, handlers: HandlerTable) -> Self {
        self.handlers = handlers;
        self
    }

    /// Advertise through `advertiser` when service discovery is enabled.
    #[must_use]
    pub fn with_advertiser(mut self, advertiser: Arc<dyn ServiceAdvertiser>) -> Self {
        self.advertiser = Some(advertiser);
        self
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Finish configuration. Nothing is bound until [`Gateway::start`].
    pub fn build(self) -> Gateway {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Gateway {
            inner: Arc::new(GatewayInner {
                controller: self.controller,
                config: self.config,
                handlers: self.handlers,
                advertiser: self.advertiser,
                metrics: self.metrics,
                notifications,
                running: Mutex::new(None),
            }),
        }
    }
}

/// A WebSocket gateway in front of one shared controller.
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    controller: Arc<dyn Controller>,
    config: ServerConfig,
    handlers: HandlerTable,
    advertiser: Option<Arc<dyn ServiceAdvertiser>>,
    metrics: Option<PrometheusHandle>,
    notifications: broadcast::Sender<GatewayEvent>,
    running: Mutex<Option<Running>>,
}

struct Running {
    addr: SocketAddr,
    manager: Arc<ConnectionManager>,
    shutdown: CancellationToken,
    server: JoinHandle<()>,
    advertisement: Option<Box<dyn Advertisement>>,
}

impl Gateway {
    /// Start configuring a gateway for `controller`.
    pub fn builder(controller: Arc<dyn Controller>, config: ServerConfig) -> GatewayBuilder {
        GatewayBuilder {
            controller,
            config,
            handlers: HandlerTable::default(),
            advertiser: None,
            metrics: None,
        }
    }

    /// Subscribe to gateway notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.notifications.subscribe()
    }

    /// Bound address while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.running.lock().await.as_ref().map(|r| r.addr)
    }

    /// Connection manager while running.
    pub async fn manager(&self) -> Option<Arc<ConnectionManager>> {
        self.inner.running.lock().await.as_ref().map(|r| r.manager.clone())
    }

    /// Whether the gateway is serving.
    pub async fn is_running(&self) -> bool {
        self.inner.running.lock().await.is_some()
    }

    /// Bind and start serving. Returns the bound address.
    ///
    /// Refuses while the controller is not ready. Calling `start` on a
    /// running gateway returns its address without rebinding.
    pub async fn start(&self) -> Result<SocketAddr, GatewayError> {
        let inner = &self.inner;
        let mut running = inner.running.lock().await;
        if let Some(current) = running.as_ref() {
            return Ok(current.addr);
        }
        if !inner.controller.is_ready() {
            return Err(GatewayError::NotReady);
        }

        let hooks: Arc<dyn LifecycleHooks> = Arc::new(GatewayLink {
            inner: Arc::downgrade(inner),
        });
        let manager = ConnectionManager::new(
            inner.controller.clone(),
            inner.config.clone(),
            inner.handlers.clone(),
            Some(hooks),
        );

        let bind_addr = inner.config.bind_addr();
        let listener = match TcpListener::bind(&bind_addr).await {
            Ok(listener) => listener,
            Err(source) => {
                error!(addr = %bind_addr, error = %source, "failed to bind");
                inner.emit(GatewayEvent::Error {
                    component: Component::HttpServer,
                    message: source.to_string(),
                });
                return Err(GatewayError::Bind { addr: bind_addr, source });
            }
        };
        let addr = listener.local_addr().map_err(GatewayError::internal)?;

        let router = build_router(AppState {
            manager: manager.clone(),
            start_time: Instant::now(),
            metrics: inner.metrics.clone(),
            notifications: inner.notifications.clone(),
        });
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(serve(
            listener,
            router,
            shutdown.clone(),
            inner.notifications.clone(),
        ));
        info!(%addr, "gateway listening");
        inner.emit(GatewayEvent::Listening { addr });

        let advertisement = inner.advertise(addr.port()).await;
        *running = Some(Running {
            addr,
            manager,
            shutdown,
            server,
            advertisement,
        });
        Ok(addr)
    }

    /// Tear down: disconnect every client, stop the server, withdraw the
    /// advertisement. Idempotent.
    pub async fn destroy(&self) {
        self.inner.destroy().await;
    }
}

impl GatewayInner {
    fn emit(&self, event: GatewayEvent) {
        // no subscribers is fine
        let _ = self.notifications.send(event);
    }

    async fn advertise(&self, port: u16) -> Option<Box<dyn Advertisement>> {
        if !self.config.enable_service_discovery {
            return None;
        }
        let advertiser = self.advertiser.as_ref()?;
        let info = ServiceInfo::for_gateway(self.controller.home_id(), port);
        let name = info.name.clone();
        match advertiser.advertise(info).await {
            Ok(advertisement) => {
                info!(%name, port, "service advertised");
                Some(advertisement)
            }
            Err(err) => {
                warn!(error = %err, "service advertisement failed");
                self.emit(GatewayEvent::Error {
                    component: Component::Discovery,
                    message: err.to_string(),
                });
                None
            }
        }
    }

    async fn destroy(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        info!(addr = %running.addr, "destroying gateway");

        running.manager.disconnect();

        running.shutdown.cancel();
        let mut server = running.server;
        if tokio::time::timeout(SERVER_SHUTDOWN_TIMEOUT, &mut server).await.is_err() {
            warn!("server did not stop in time, aborting");
            server.abort();
        }

        if let Some(advertisement) = running.advertisement {
            advertisement.stop().await;
        }
        info!("gateway destroyed");
    }

    async fn resume(&self) {
        let mut running = self.running.lock().await;
        let Some(running) = running.as_mut() else {
            return;
        };
        if let Some(old) = running.advertisement.take() {
            old.stop().await;
        }
        running.advertisement = self.advertise(running.addr.port()).await;
        info!(addr = %running.addr, "gateway resumed after hard reset");
    }
}

async fn serve(
    listener: TcpListener,
    router: axum::Router,
    shutdown: CancellationToken,
    notifications: broadcast::Sender<GatewayEvent>,
) {
    let result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await;
    if let Err(err) = result {
        error!(error = %err, "http server failed");
        let _ = notifications.send(GatewayEvent::Error {
            component: Component::HttpServer,
            message: err.to_string(),
        });
    }
}

/// Manager-side handle back into the gateway.
struct GatewayLink {
    inner: Weak<GatewayInner>,
}

#[async_trait]
impl LifecycleHooks for GatewayLink {
    async fn destroy(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.destroy().await;
        }
    }

    async fn resume(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.resume().await;
        }
    }

    fn notify(&self, event: GatewayEvent) {
        if let Some(inner) = self.inner.upgrade() {
            inner.emit(event);
        }
    }
}
