//! `controller.*` commands.

use async_trait::async_trait;
use serde_json::{Value, json};
use wavegate_core::errors::GatewayError;

use super::{CommandHandler, HandlerContext, Passthrough};
use crate::protocol::messages::IncomingMessage;
use crate::protocol::router::Namespace;

/// Hard-reset the controller.
pub const HARD_RESET: &str = "hard_reset";

/// Handler family for the `controller` namespace.
pub struct ControllerCommands;

#[async_trait]
impl CommandHandler for ControllerCommands {
    async fn handle(
        &self,
        verb: &str,
        message: &IncomingMessage,
        ctx: &HandlerContext,
    ) -> Result<Value, GatewayError> {
        if verb == HARD_RESET {
            ctx.manager.hard_reset().await?;
            return Ok(json!({}));
        }
        Passthrough::new(Namespace::Controller)
            .handle(verb, message, ctx)
            .await
    }
}
