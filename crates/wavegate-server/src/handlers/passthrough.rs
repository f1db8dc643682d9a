//! Forwards namespaced commands to the controller unchanged.

use async_trait::async_trait;
use serde_json::Value;
use tracing::instrument;
use wavegate_core::controller::CommandRequest;
use wavegate_core::errors::GatewayError;

use super::{CommandHandler, HandlerContext};
use crate::protocol::messages::IncomingMessage;
use crate::protocol::router::Namespace;

/// Hands every verb of one namespace to [`Controller::execute`](wavegate_core::controller::Controller::execute).
pub struct Passthrough {
    namespace: Namespace,
}

impl Passthrough {
    /// Passthrough for `namespace`.
    pub fn new(namespace: Namespace) -> Self {
        Self { namespace }
    }
}

#[async_trait]
impl CommandHandler for Passthrough {
    #[instrument(skip_all, fields(namespace = %self.namespace, verb = %verb))]
    async fn handle(
        &self,
        verb: &str,
        message: &IncomingMessage,
        ctx: &HandlerContext,
    ) -> Result<Value, GatewayError> {
        let request = CommandRequest {
            namespace: self.namespace.prefix(),
            verb,
            args: &message.fields,
            schema_version: ctx.session.schema_version(),
        };
        Ok(ctx.manager.controller().execute(request).await?)
    }
}
