//! In-memory queue implementation for development and testing
//!
//! Mimics pull-subscription semantics: pulled messages move to an in-flight
//! set until acknowledged, and can be pushed back for redelivery.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::traits::{MessageQueue, QueueMessage};
use crate::error::{RelayError, Result};

#[derive(Debug, Clone)]
struct StoredMessage {
    seq: u64,
    message_id: String,
    data: Vec<u8>,
    publish_time: chrono::DateTime<Utc>,
    delivery_attempt: u32,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<StoredMessage>,
    in_flight: HashMap<String, StoredMessage>, // ack_id -> message
    next_id: u64,
    acknowledged: u64,
}

#[derive(Default)]
pub struct InMemoryQueue {
    state: Arc<Mutex<QueueState>>,
    fail_pulls: Arc<Mutex<usize>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message and return its message id
    pub async fn publish(&self, data: impl Into<Vec<u8>>) -> String {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let seq = state.next_id;
        let message_id = format!("msg_{}", seq);
        state.pending.push_back(StoredMessage {
            seq,
            message_id: message_id.clone(),
            data: data.into(),
            publish_time: Utc::now(),
            delivery_attempt: 0,
        });
        message_id
    }

    /// Return every unacknowledged in-flight message to the front of the
    /// queue, as an expired ack deadline would
    pub async fn redeliver_unacked(&self) -> usize {
        let mut state = self.state.lock().await;
        let mut expired: Vec<StoredMessage> = state.in_flight.drain().map(|(_, m)| m).collect();
        expired.sort_by_key(|m| m.seq);
        let count = expired.len();
        for message in expired.into_iter().rev() {
            state.pending.push_front(message);
        }
        count
    }

    /// Make the next `count` pulls fail, to exercise error paths
    pub async fn fail_next_pulls(&self, count: usize) {
        *self.fail_pulls.lock().await = count;
    }

    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn in_flight_count(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    pub async fn acknowledged_count(&self) -> u64 {
        self.state.lock().await.acknowledged
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn pull(&self, max_messages: usize) -> Result<Vec<QueueMessage>> {
        {
            let mut failures = self.fail_pulls.lock().await;
            if *failures > 0 {
                *failures -= 1;
                return Err(RelayError::QueueError("Simulated pull failure".to_string()));
            }
        }

        let mut state = self.state.lock().await;
        let take = max_messages.min(state.pending.len());
        let mut batch = Vec::with_capacity(take);

        for _ in 0..take {
            let Some(mut message) = state.pending.pop_front() else {
                break;
            };
            message.delivery_attempt += 1;
            let ack_id = Uuid::new_v4().to_string();
            batch.push(QueueMessage {
                ack_id: ack_id.clone(),
                message_id: message.message_id.clone(),
                data: message.data.clone(),
                payload_error: None,
                publish_time: Some(message.publish_time),
                delivery_attempt: Some(message.delivery_attempt),
            });
            state.in_flight.insert(ack_id, message);
        }

        Ok(batch)
    }

    async fn acknowledge(&self, ack_ids: &[String]) -> Result<()> {
        let mut state = self.state.lock().await;
        for ack_id in ack_ids {
            if state.in_flight.remove(ack_id).is_some() {
                state.acknowledged += 1;
            }
        }
        Ok(())
    }
}
