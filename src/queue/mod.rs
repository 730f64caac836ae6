//! Message queue abstraction
//!
//! The worker only needs two capabilities from a queue: long-poll receive and
//! acknowledgment (permanent removal). Unacknowledged messages become visible
//! again according to the queue's own redelivery policy.

pub mod memory;
pub mod sqs;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use memory::InMemoryQueue;
pub use sqs::SqsQueue;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Acknowledge failed for message {message_id}: {reason}")]
    Acknowledge { message_id: String, reason: String },

    #[error("Queue configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, QueueError>;

/// A received message; `receipt` identifies this particular delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: String,
    pub body: String,
    pub receipt: String,
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Wait up to `wait` for at most `max_messages` messages
    async fn receive(&self, max_messages: u32, wait: Duration) -> Result<Vec<QueueMessage>>;

    /// Remove a delivered message from the queue for good
    async fn acknowledge(&self, message: &QueueMessage) -> Result<()>;
}
