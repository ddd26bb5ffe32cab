//! Command Relay - drains a Pub/Sub subscription and broadcasts every
//! command to the WebSocket clients connected at that moment.

pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;
pub mod queue;
pub mod server;
pub mod shutdown;

// Re-export main components
pub use config::*;
pub use constants::*;
