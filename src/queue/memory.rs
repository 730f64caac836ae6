//! In-process queue used by tests and local runs
//!
//! Received messages move to an in-flight set until acknowledged.
//! [`InMemoryQueue::expire_in_flight`] stands in for the visibility timeout
//! of a real queue and makes unacknowledged messages deliverable again.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::{Instant, timeout_at};
use uuid::Uuid;

use super::{MessageQueue, QueueError, QueueMessage, Result};

/// Number of acknowledged ids kept for inspection
pub const ACKNOWLEDGED_HISTORY: usize = 1024;

#[derive(Debug, Clone)]
struct StoredMessage {
    id: String,
    body: String,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<StoredMessage>,
    /// Keyed by receipt
    in_flight: HashMap<String, StoredMessage>,
    /// Most recent acknowledgments, oldest dropped past [`ACKNOWLEDGED_HISTORY`]
    acknowledged: VecDeque<String>,
}

#[derive(Debug, Default)]
pub struct InMemoryQueue {
    state: Mutex<QueueState>,
    available: Notify,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a message body, returning its id
    pub async fn push(&self, body: impl Into<String>) -> String {
        let id = Uuid::new_v4().to_string();
        self.state.lock().await.pending.push_back(StoredMessage {
            id: id.clone(),
            body: body.into(),
        });
        self.available.notify_waiters();
        id
    }

    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn in_flight_len(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    /// Ids of the last [`ACKNOWLEDGED_HISTORY`] acknowledged messages, in acknowledgment order
    pub async fn acknowledged(&self) -> Vec<String> {
        self.state.lock().await.acknowledged.iter().cloned().collect()
    }

    /// Return every unacknowledged in-flight message to the queue
    pub async fn expire_in_flight(&self) -> usize {
        let mut state = self.state.lock().await;
        let expired: Vec<StoredMessage> = state.in_flight.drain().map(|(_, m)| m).collect();
        let count = expired.len();
        state.pending.extend(expired);
        drop(state);

        if count > 0 {
            self.available.notify_waiters();
        }
        count
    }

    async fn take_batch(&self, max_messages: u32) -> Vec<QueueMessage> {
        let mut state = self.state.lock().await;
        let mut batch = Vec::new();

        while batch.len() < max_messages as usize {
            let Some(message) = state.pending.pop_front() else {
                break;
            };
            let receipt = Uuid::new_v4().to_string();
            batch.push(QueueMessage {
                id: message.id.clone(),
                body: message.body.clone(),
                receipt: receipt.clone(),
            });
            state.in_flight.insert(receipt, message);
        }

        batch
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn receive(&self, max_messages: u32, wait: Duration) -> Result<Vec<QueueMessage>> {
        let deadline = Instant::now() + wait;

        loop {
            // Register interest before checking so a concurrent push is not missed
            let notified = self.available.notified();

            let batch = self.take_batch(max_messages).await;
            if !batch.is_empty() {
                return Ok(batch);
            }

            if timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn acknowledge(&self, message: &QueueMessage) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(stored) = state.in_flight.remove(&message.receipt) else {
            return Err(QueueError::Acknowledge {
                message_id: message.id.clone(),
                reason: "unknown or expired receipt".to_string(),
            });
        };
        if state.acknowledged.len() == ACKNOWLEDGED_HISTORY {
            state.acknowledged.pop_front();
        }
        state.acknowledged.push_back(stored.id);
        Ok(())
    }
}
