//! WebSocket connection handle
//! The registry and broadcaster only ever hold shared references to it

use log::trace;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use uuid::Uuid;
use warp::ws::Message;

use crate::error::{RelayError, Result};

/// Represents a single live client connection
#[derive(Debug)]
pub struct Connection {
    pub id: String,
    pub sender: mpsc::Sender<Message>,
    pub connected_at: Instant,
}

impl Connection {
    /// Create a new connection with a unique ID
    pub fn new(sender: mpsc::Sender<Message>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), sender)
    }

    pub fn with_id(id: String, sender: mpsc::Sender<Message>) -> Self {
        Self {
            id,
            sender,
            connected_at: Instant::now(),
        }
    }

    /// Queue a text frame for this connection, waiting at most `timeout`
    /// for room in its outbound buffer
    pub async fn send_text(&self, text: &str, timeout: Duration) -> Result<()> {
        match self.sender.send_timeout(Message::text(text), timeout).await {
            Ok(()) => {
                trace!("Queued frame for client {}", self.id);
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => Err(RelayError::SendTimeout(self.id.clone())),
            Err(SendTimeoutError::Closed(_)) => Err(RelayError::ConnectionClosed),
        }
    }

    /// Whether the socket writer is still draining this connection
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Calculate the connection duration
    pub fn connection_duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
