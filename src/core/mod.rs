//! Core relay functionality

pub mod broadcaster;
pub mod connection;
pub mod message;
pub mod poller;
pub mod registry;

// Re-export main components for convenience
pub use broadcaster::{BroadcastStats, Broadcaster};
pub use connection::Connection;
pub use message::{decode_command, Command, CommandMessage, DecodedCommand};
pub use poller::{PollStats, QueuePoller};
pub use registry::{create_registry, ConnectionRegistry, RegistrationGuard, SharedRegistry};
