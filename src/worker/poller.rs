//! Delivery loop: receive, process, acknowledge, pause, repeat

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::pipeline::{MessageOutcome, Pipeline};
use crate::queue::{MessageQueue, QueueError, QueueMessage};

/// Poller configuration
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub max_messages: u32,
    pub wait_time: Duration,
    pub idle_delay: Duration,
}

impl PollerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_messages: config.queue.max_messages,
            wait_time: config.queue.wait_time(),
            idle_delay: config.worker.idle_delay(),
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            max_messages: 1,
            wait_time: Duration::from_secs(20),
            idle_delay: Duration::from_secs(1),
        }
    }
}

/// Counts for one receive-and-process round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub received: usize,
    pub acknowledged: usize,
    pub unrecognized: usize,
    pub failed: usize,
}

pub struct Poller {
    queue: Arc<dyn MessageQueue>,
    pipeline: Arc<Pipeline>,
    config: PollerConfig,
}

impl Poller {
    pub fn new(queue: Arc<dyn MessageQueue>, pipeline: Arc<Pipeline>, config: PollerConfig) -> Self {
        Self {
            queue,
            pipeline,
            config,
        }
    }

    /// Receive one batch and process it.
    ///
    /// Only queue connectivity errors are returned; processing failures are
    /// counted in the summary and leave their messages unacknowledged.
    pub async fn poll_once(&self) -> Result<PollSummary, QueueError> {
        let messages = self.receive().await?;
        Ok(self.process_batch(&messages).await)
    }

    /// Loop until `shutdown` resolves.
    ///
    /// Shutdown is only observed while waiting for messages or pausing, so a
    /// message that is being processed is always finished.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(
            max_messages = self.config.max_messages,
            wait_secs = self.config.wait_time.as_secs(),
            "Poller started"
        );

        loop {
            let received = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                received = self.receive() => received,
            };

            match received {
                Ok(messages) if messages.is_empty() => debug!("No messages"),
                Ok(messages) => {
                    let summary = self.process_batch(&messages).await;
                    debug!(?summary, "Batch processed");
                }
                Err(e) => error!(error = %e, "Receive failed, retrying after delay"),
            }

            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.config.idle_delay) => {}
            }
        }

        info!("Poller stopped");
    }

    async fn receive(&self) -> Result<Vec<QueueMessage>, QueueError> {
        self.queue
            .receive(self.config.max_messages, self.config.wait_time)
            .await
    }

    async fn process_batch(&self, messages: &[QueueMessage]) -> PollSummary {
        let mut summary = PollSummary::default();
        for message in messages {
            self.process_message(message, &mut summary).await;
        }
        summary
    }

    async fn process_message(&self, message: &QueueMessage, summary: &mut PollSummary) {
        let metrics = self.pipeline.metrics();
        metrics.message_received();
        summary.received += 1;
        info!(message_id = %message.id, "Message received");

        match self.pipeline.process_message(&message.body).await {
            Ok(outcome) => {
                if outcome == MessageOutcome::NotStorageEvent {
                    metrics.message_unrecognized();
                    summary.unrecognized += 1;
                }

                match self.queue.acknowledge(message).await {
                    Ok(()) => {
                        metrics.message_acknowledged();
                        summary.acknowledged += 1;
                        info!(message_id = %message.id, "Message acknowledged");
                    }
                    // Redelivery only repeats idempotent writes
                    Err(e) => warn!(message_id = %message.id, error = %e, "Acknowledge failed"),
                }
            }
            Err(e) => {
                metrics.message_failed();
                summary.failed += 1;
                error!(message_id = %message.id, error = %e, "Message failed, leaving it for redelivery");
            }
        }
    }
}
