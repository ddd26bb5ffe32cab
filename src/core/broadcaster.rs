//! Concurrent fan-out of one payload to a connection snapshot
//!
//! Every recipient gets its own task. A failed, timed out or panicked send
//! only affects its own recipient; the call itself never fails.

use log::{debug, trace, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::connection::Connection;

#[derive(Debug, Clone)]
pub struct Broadcaster {
    send_timeout: Duration,
}

impl Broadcaster {
    pub fn new(send_timeout: Duration) -> Self {
        Self { send_timeout }
    }

    /// Deliver `payload` to every recipient concurrently and wait for all
    /// attempts to settle
    pub async fn broadcast(
        &self,
        payload: &str,
        recipients: Vec<Arc<Connection>>,
    ) -> BroadcastStats {
        let start = Instant::now();
        let total_recipients = recipients.len();

        if total_recipients == 0 {
            trace!("Broadcast skipped, no connected clients");
            return BroadcastStats::default();
        }

        // Writers that already went away fail without a send attempt
        let (open, closed): (Vec<_>, Vec<_>) =
            recipients.into_iter().partition(|connection| connection.is_open());
        for connection in &closed {
            debug!("Skipping closed client {}", connection.id);
        }

        let payload: Arc<str> = Arc::from(payload);
        let send_tasks: Vec<_> = open
            .into_iter()
            .map(|connection| {
                let payload = payload.clone();
                let timeout = self.send_timeout;
                tokio::spawn(async move {
                    match connection.send_text(&payload, timeout).await {
                        Ok(()) => true,
                        Err(e) => {
                            warn!("Failed to deliver to client {}: {}", connection.id, e);
                            false
                        }
                    }
                })
            })
            .collect();

        let results = futures_util::future::join_all(send_tasks).await;

        let delivered = results
            .into_iter()
            .filter_map(|result| result.ok()) // A panicked send counts as failed
            .filter(|&success| success)
            .count();

        let stats = BroadcastStats {
            total_recipients,
            delivered,
            failed: total_recipients - delivered,
            duration: start.elapsed(),
        };
        debug!(
            "Broadcast to {}/{} clients ({:.0}%) in {:?}",
            stats.delivered,
            stats.total_recipients,
            stats.success_rate() * 100.0,
            stats.duration
        );
        stats
    }
}

/// Outcome of one broadcast call
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BroadcastStats {
    pub total_recipients: usize,
    pub delivered: usize,
    pub failed: usize,
    pub duration: Duration,
}

impl BroadcastStats {
    pub fn success_rate(&self) -> f64 {
        if self.total_recipients == 0 {
            1.0
        } else {
            self.delivered as f64 / self.total_recipients as f64
        }
    }
}
