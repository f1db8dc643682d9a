//! Handler families, one per command namespace.
//!
//! The router picks a [`Namespace`]; the [`HandlerTable`] holds exactly one
//! [`CommandHandler`] for each. The default table forwards everything to the
//! controller except the driver and controller commands the gateway
//! implements itself (log listening and hard reset).

pub mod controller;
pub mod driver;
pub mod passthrough;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use wavegate_core::errors::GatewayError;

use crate::manager::ConnectionManager;
use crate::protocol::messages::IncomingMessage;
use crate::protocol::router::Namespace;
use crate::websocket::session::ClientSession;

pub use passthrough::Passthrough;

/// Everything a handler may touch while serving one command.
pub struct HandlerContext {
    /// The gateway's connection manager (and through it, the controller).
    pub manager: Arc<ConnectionManager>,
    /// The session that sent the command.
    pub session: Arc<ClientSession>,
}

/// Serves the commands of one namespace.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle `verb` (the command text after the namespace).
    async fn handle(
        &self,
        verb: &str,
        message: &IncomingMessage,
        ctx: &HandlerContext,
    ) -> Result<Value, GatewayError>;
}

/// One handler per namespace.
#[derive(Clone)]
pub struct HandlerTable {
    controller: Arc<dyn CommandHandler>,
    driver: Arc<dyn CommandHandler>,
    node: Arc<dyn CommandHandler>,
    endpoint: Arc<dyn CommandHandler>,
    multicast_group: Arc<dyn CommandHandler>,
    broadcast_node: Arc<dyn CommandHandler>,
    utils: Arc<dyn CommandHandler>,
}

impl HandlerTable {
    /// Handler for `namespace`.
    pub fn get(&self, namespace: Namespace) -> &Arc<dyn CommandHandler> {
        match namespace {
            Namespace::Controller => &self.controller,
            Namespace::Driver => &self.driver,
            Namespace::Node => &self.node,
            Namespace::Endpoint => &self.endpoint,
            Namespace::MulticastGroup => &self.multicast_group,
            Namespace::BroadcastNode => &self.broadcast_node,
            Namespace::Utils => &self.utils,
        }
    }

    /// Replace the handler for `namespace`.
    #[must_use]
    pub fn with(mut self, namespace: Namespace, handler: Arc<dyn CommandHandler>) -> Self {
        let slot = match namespace {
            Namespace::Controller => &mut self.controller,
            Namespace::Driver => &mut self.driver,
            Namespace::Node => &mut self.node,
            Namespace::Endpoint => &mut self.endpoint,
            Namespace::MulticastGroup => &mut self.multicast_group,
            Namespace::BroadcastNode => &mut self.broadcast_node,
            Namespace::Utils => &mut self.utils,
        };
        *slot = handler;
        self
    }
}

impl Default for HandlerTable {
    fn default() -> Self {
        Self {
            controller: Arc::new(controller::ControllerCommands),
            driver: Arc::new(driver::DriverCommands),
            node: Arc::new(Passthrough::new(Namespace::Node)),
            endpoint: Arc::new(Passthrough::new(Namespace::Endpoint)),
            multicast_group: Arc::new(Passthrough::new(Namespace::MulticastGroup)),
            broadcast_node: Arc::new(Passthrough::new(Namespace::BroadcastNode)),
            utils: Arc::new(Passthrough::new(Namespace::Utils)),
        }
    }
}
