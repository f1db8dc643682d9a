//! # wavegate-core
//!
//! Shared building blocks for the wavegate gateway:
//!
//! - [`controller`]: the [`Controller`](controller::Controller) trait, the single
//!   boundary to the shared device controller
//! - [`errors`]: wire error codes plus [`ControllerError`](errors::ControllerError)
//!   and [`GatewayError`](errors::GatewayError)
//! - [`events`] / [`logs`]: domain events and log records published by the controller
//! - [`logging`]: `tracing` subscriber setup
//! - [`sim`]: an in-memory controller used by tests and the demo binary

#![deny(unsafe_code)]

pub mod controller;
pub mod errors;
pub mod events;
pub mod logging;
pub mod logs;
pub mod sim;
