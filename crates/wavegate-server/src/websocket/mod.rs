//! WebSocket client handling: sessions, the session registry, the heartbeat
//! and the socket pump.

pub mod heartbeat;
pub mod registry;
pub mod session;
pub mod socket;
