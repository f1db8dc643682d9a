//! # wavegate
//!
//! Gateway binary: loads settings, starts the WebSocket gateway over an
//! in-memory controller and serves until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use wavegate_core::sim::SimulatedController;
use wavegate_server::config::ServerConfig;
use wavegate_server::gateway::{Gateway, GatewayEvent};
use wavegate_server::settings;

/// Multi-client WebSocket gateway.
#[derive(Parser, Debug)]
#[command(name = "wavegate", about = "Multi-client WebSocket gateway")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.wavegate/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,

    /// Shut down after a controller hard reset instead of resuming.
    #[arg(long)]
    destroy_on_hard_reset: bool,

    /// Home id of the simulated controller.
    #[arg(long, default_value_t = 0xe1a5_0001)]
    home_id: u32,

    /// Nodes to pre-populate the simulated controller with.
    #[arg(long, default_value_t = 3)]
    nodes: u32,
}

impl Cli {
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.destroy_on_hard_reset {
            config.destroy_on_hard_reset = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    wavegate_core::logging::init_subscriber(&args.log_level, args.json_logs);

    let settings_path = args.config.clone().unwrap_or_else(settings::settings_path);
    let mut config = settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut config);

    let metrics = wavegate_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let controller = Arc::new(SimulatedController::new(args.home_id));
    for node_id in 1..=args.nodes {
        let _ = controller.add_node(node_id, None);
    }

    let gateway = Gateway::builder(controller, config).with_metrics(metrics).build();
    let mut notifications = gateway.subscribe();
    let addr = gateway.start().await.context("Failed to start gateway")?;
    tracing::info!("wavegate listening on ws://{addr}/");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for ctrl-c")?;
                tracing::info!("Shutting down...");
                break;
            }
            event = notifications.recv() => match event {
                Ok(GatewayEvent::HardReset) => {
                    tracing::info!("gateway destroyed after hard reset");
                    break;
                }
                Ok(GatewayEvent::Error { component, message }) => {
                    tracing::warn!(%component, %message, "gateway component failed");
                }
                Ok(GatewayEvent::Listening { .. }) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    gateway.destroy().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
