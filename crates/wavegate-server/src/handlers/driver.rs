//! `driver.*` commands: log listening and hard reset are served by the
//! gateway, the rest go to the controller.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, instrument};
use wavegate_core::errors::GatewayError;
use wavegate_core::logs::LogFilter;

use super::{CommandHandler, HandlerContext, Passthrough};
use crate::protocol::messages::IncomingMessage;
use crate::protocol::router::Namespace;

/// Start receiving controller log records.
pub const START_LISTENING_LOGS: &str = "start_listening_logs";
/// Stop receiving controller log records.
pub const STOP_LISTENING_LOGS: &str = "stop_listening_logs";
/// Hard-reset the controller.
pub const HARD_RESET: &str = "hard_reset";

/// Handler family for the `driver` namespace.
pub struct DriverCommands;

#[async_trait]
impl CommandHandler for DriverCommands {
    #[instrument(skip_all, fields(verb = %verb, client_id = %ctx.session.id()))]
    async fn handle(
        &self,
        verb: &str,
        message: &IncomingMessage,
        ctx: &HandlerContext,
    ) -> Result<Value, GatewayError> {
        match verb {
            START_LISTENING_LOGS => {
                let filter = parse_filter(message)?;
                ctx.session.set_receive_logs(true);
                ctx.manager.configure_logging(filter);
                debug!("client listening for logs");
                Ok(json!({}))
            }
            STOP_LISTENING_LOGS => {
                ctx.session.set_receive_logs(false);
                ctx.manager.cleanup_logging_forwarder();
                debug!("client stopped listening for logs");
                Ok(json!({}))
            }
            HARD_RESET => {
                ctx.manager.hard_reset().await?;
                Ok(json!({}))
            }
            _ => {
                Passthrough::new(Namespace::Driver)
                    .handle(verb, message, ctx)
                    .await
            }
        }
    }
}

fn parse_filter(message: &IncomingMessage) -> Result<Option<LogFilter>, GatewayError> {
    match message.field("filter") {
        None | Some(Value::Null) => Ok(None),
        Some(raw) => serde_json::from_value(raw.clone())
            .map(Some)
            .map_err(|err| GatewayError::invalid_params(format!("invalid log filter: {err}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{connect, gateway_manager, next_json};
    use wavegate_core::logs::{LogLevel, LogRecord};

    fn message(command: &str, fields: Value) -> IncomingMessage {
        let mut value = fields;
        value["messageId"] = json!("1");
        value["command"] = json!(command);
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn start_and_stop_listening_logs() {
        let (manager, sim) = gateway_manager();
        let (session, mut rx) = connect(&manager);
        let _ = next_json(&mut rx).await;
        let ctx = HandlerContext {
            manager: manager.clone(),
            session: session.clone(),
        };

        let _ = DriverCommands
            .handle(START_LISTENING_LOGS, &message("driver.start_listening_logs", json!({})), &ctx)
            .await
            .unwrap();
        assert!(session.receives_logs());
        assert!(manager.logging_forwarder_running());

        sim.log(LogRecord::now(LogLevel::Warn, "DRIVER", "careful"));
        let event = next_json(&mut rx).await;
        assert_eq!(event["event"]["event"], "logging");

        let _ = DriverCommands
            .handle(STOP_LISTENING_LOGS, &message("driver.stop_listening_logs", json!({})), &ctx)
            .await
            .unwrap();
        assert!(!session.receives_logs());
        assert!(!manager.logging_forwarder_running());
    }

    #[tokio::test]
    async fn filter_is_applied() {
        let (manager, sim) = gateway_manager();
        let (session, mut rx) = connect(&manager);
        let _ = next_json(&mut rx).await;
        let ctx = HandlerContext { manager, session };

        let _ = DriverCommands
            .handle(
                START_LISTENING_LOGS,
                &message("driver.start_listening_logs", json!({"filter": {"nodeId": 5}})),
                &ctx,
            )
            .await
            .unwrap();

        sim.log(LogRecord::now(LogLevel::Info, "CNTRLR", "other").with_context("nodeId", 6));
        sim.log(LogRecord::now(LogLevel::Info, "CNTRLR", "mine").with_context("nodeId", 5));
        assert_eq!(next_json(&mut rx).await["event"]["message"], "mine");
    }

    #[tokio::test]
    async fn invalid_filter() {
        let (manager, _sim) = gateway_manager();
        let (session, _rx) = connect(&manager);
        let ctx = HandlerContext {
            manager: manager.clone(),
            session: session.clone(),
        };

        let err = DriverCommands
            .handle(
                START_LISTENING_LOGS,
                &message("driver.start_listening_logs", json!({"filter": "everything"})),
                &ctx,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalidParamsPassedToCommand");
        assert!(!session.receives_logs());
        assert!(!manager.logging_forwarder_running());
    }

    #[tokio::test]
    async fn other_verbs_reach_controller() {
        let (manager, _sim) = gateway_manager();
        let (session, _rx) = connect(&manager);
        let ctx = HandlerContext { manager, session };

        let result = DriverCommands
            .handle("get_config", &message("driver.get_config", json!({})), &ctx)
            .await
            .unwrap();
        assert_eq!(result["config"]["homeId"], 0xcafe);
    }
}
