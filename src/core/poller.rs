//! Queue polling loop
//!
//! Each cycle pulls one batch, then for every message in order: decode,
//! broadcast, acknowledge. Messages are acknowledged whatever happened to
//! them, so a malformed payload is dropped instead of redelivered forever.

use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::config::RelayConfig;
use crate::core::broadcaster::Broadcaster;
use crate::core::message::decode_command;
use crate::core::registry::SharedRegistry;
use crate::error::Result;
use crate::queue::{MessageQueue, QueueMessage};
use crate::shutdown::wait_for_shutdown;

pub struct QueuePoller {
    queue: Arc<dyn MessageQueue>,
    registry: SharedRegistry,
    broadcaster: Broadcaster,
    batch_size: usize,
    poll_interval: Duration,
}

impl QueuePoller {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        registry: SharedRegistry,
        broadcaster: Broadcaster,
        batch_size: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            registry,
            broadcaster,
            batch_size: batch_size.max(1),
            poll_interval,
        }
    }

    pub fn from_config(
        config: &RelayConfig,
        queue: Arc<dyn MessageQueue>,
        registry: SharedRegistry,
    ) -> Self {
        Self::new(
            queue,
            registry,
            Broadcaster::new(config.send_timeout),
            config.batch_size,
            config.poll_interval,
        )
    }

    /// Poll until `shutdown` turns true or its sender goes away
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Queue poller started (batch size {}, interval {:?})",
            self.batch_size, self.poll_interval
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            // A waiting pull is abandoned on shutdown; nothing is acknowledged yet
            let pulled = tokio::select! {
                pulled = self.queue.pull(self.batch_size) => pulled,
                _ = wait_for_shutdown(shutdown.clone()) => break,
            };

            match pulled {
                Ok(batch) => {
                    let stats = self.process_batch(batch).await;
                    if stats.pulled > 0 {
                        debug!("Poll cycle: {:?}", stats);
                    }
                }
                Err(e) => warn!(
                    "Queue pull failed, retrying after {:?}: {}",
                    self.poll_interval, e
                ),
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("Queue poller stopped");
    }

    /// Run one pull-decode-broadcast-acknowledge cycle
    pub async fn poll_once(&self) -> Result<PollStats> {
        let batch = self.queue.pull(self.batch_size).await?;
        Ok(self.process_batch(batch).await)
    }

    async fn process_batch(&self, batch: Vec<QueueMessage>) -> PollStats {
        let mut stats = PollStats {
            pulled: batch.len(),
            ..PollStats::default()
        };

        for message in batch {
            self.process(&message, &mut stats).await;

            match self.queue.acknowledge(std::slice::from_ref(&message.ack_id)).await {
                Ok(()) => stats.acknowledged += 1,
                Err(e) => {
                    stats.ack_failures += 1;
                    warn!("Failed to acknowledge message {}: {}", message.message_id, e);
                }
            }
        }

        stats
    }

    async fn process(&self, message: &QueueMessage, stats: &mut PollStats) {
        let decoded = match message.payload().and_then(decode_command) {
            Ok(decoded) => decoded,
            Err(e) => {
                stats.decode_failures += 1;
                warn!("Dropping undecodable message {}: {}", message.message_id, e);
                return;
            }
        };

        let recipients = self.registry.snapshot();
        let result = self.broadcaster.broadcast(&decoded.text, recipients).await;
        debug!(
            "Relayed '{}' from message {} to {}/{} clients",
            decoded.command, message.message_id, result.delivered, result.total_recipients
        );

        stats.broadcast += 1;
        stats.deliveries_attempted += result.total_recipients;
        stats.deliveries_succeeded += result.delivered;
    }
}

/// Counters for one poll cycle
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollStats {
    pub pulled: usize,
    pub broadcast: usize,
    pub decode_failures: usize,
    pub deliveries_attempted: usize,
    pub deliveries_succeeded: usize,
    pub acknowledged: usize,
    pub ack_failures: usize,
}
