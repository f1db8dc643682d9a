//! Background tasks that fan controller output out to client sessions.

pub mod events;
pub mod logging;
