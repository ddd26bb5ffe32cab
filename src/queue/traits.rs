//! Abstract queue interface for pluggable backends
//!
//! The relay only needs two primitives from its queue: pull a bounded batch
//! and acknowledge by token. Unacknowledged messages may be redelivered.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{RelayError, Result};

/// A message pulled from the queue, not yet acknowledged
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMessage {
    /// Opaque token required to acknowledge this delivery
    pub ack_id: String,
    /// Queue-assigned message id, stable across redeliveries
    pub message_id: String,
    pub data: Vec<u8>,
    /// Set when the transport could not recover the payload bytes
    pub payload_error: Option<String>,
    pub publish_time: Option<DateTime<Utc>>,
    pub delivery_attempt: Option<u32>,
}

impl QueueMessage {
    /// The payload bytes, or why they are unusable
    pub fn payload(&self) -> Result<&[u8]> {
        match &self.payload_error {
            Some(reason) => Err(RelayError::MessageParseError(reason.clone())),
            None => Ok(&self.data),
        }
    }
}

/// Pull/acknowledge consumer interface
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Pull up to `max_messages` pending messages. An empty batch is normal.
    async fn pull(&self, max_messages: usize) -> Result<Vec<QueueMessage>>;

    /// Acknowledge delivered messages. Unknown or already acknowledged
    /// tokens are ignored.
    async fn acknowledge(&self, ack_ids: &[String]) -> Result<()>;
}
