//! Queue consumers the relay can drain

pub mod memory;
pub mod pubsub;
pub mod traits;

pub use memory::InMemoryQueue;
pub use pubsub::PubSubClient;
pub use traits::{MessageQueue, QueueMessage};
