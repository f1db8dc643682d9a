//! # wavegate-server
//!
//! Multi-client `WebSocket` gateway in front of one shared controller.
//!
//! - Per-client sessions with schema negotiation and JSON message dispatch
//! - Connection manager: registry, heartbeat, coalesced cleanup, hard reset
//! - Event and log fan-out from the controller to subscribed sessions
//! - Gateway lifecycle: bind, serve (`/`, `/health`, `/metrics`), advertise, destroy

#![deny(unsafe_code)]

pub mod config;
pub mod discovery;
pub mod forward;
pub mod gateway;
pub mod handlers;
pub mod health;
pub mod manager;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod settings;
pub mod websocket;

#[cfg(test)]
mod testing;

/// Version reported to clients in the greeting.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
