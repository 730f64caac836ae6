//! Amazon SQS backend

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sqs::Client;
use aws_sdk_sqs::error::DisplayErrorContext;
use std::time::Duration;
use tracing::{debug, warn};

use super::{MessageQueue, QueueError, QueueMessage, Result};
use crate::config::QueueConfig;

const FALLBACK_REGION: &str = "us-east-1";

pub struct SqsQueue {
    client: Client,
    queue_url: String,
    visibility_timeout: Option<Duration>,
}

impl SqsQueue {
    pub fn new(client: Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
            visibility_timeout: None,
        }
    }

    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = Some(timeout);
        self
    }

    /// Build a client from the ambient AWS configuration plus overrides
    pub async fn connect(config: &QueueConfig) -> Result<Self> {
        let queue_url = config
            .url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| QueueError::Configuration("queue url is not set".to_string()))?;

        let region = RegionProviderChain::first_try(config.region.clone().map(Region::new))
            .or_default_provider()
            .or_else(Region::new(FALLBACK_REGION));
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region);
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let mut queue = Self::new(Client::new(&sdk_config), queue_url);
        if let Some(secs) = config.visibility_timeout_secs {
            queue = queue.with_visibility_timeout(Duration::from_secs(secs.into()));
        }

        debug!(queue_url = %queue.queue_url, "SQS client ready");
        Ok(queue)
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }
}

#[async_trait]
impl MessageQueue for SqsQueue {
    async fn receive(&self, max_messages: u32, wait: Duration) -> Result<Vec<QueueMessage>> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(to_i32(max_messages.into()))
            .wait_time_seconds(to_i32(wait.as_secs()))
            .set_visibility_timeout(self.visibility_timeout.map(|t| to_i32(t.as_secs())))
            .send()
            .await
            .map_err(|e| QueueError::Receive(DisplayErrorContext(&e).to_string()))?;

        let mut messages = Vec::with_capacity(output.messages().len());
        for message in output.messages() {
            let id = message.message_id().unwrap_or_default().to_string();
            let Some(receipt) = message.receipt_handle() else {
                warn!(message_id = %id, "Received message without receipt handle, ignoring");
                continue;
            };

            messages.push(QueueMessage {
                id,
                body: message.body().unwrap_or_default().to_string(),
                receipt: receipt.to_string(),
            });
        }

        Ok(messages)
    }

    async fn acknowledge(&self, message: &QueueMessage) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(&message.receipt)
            .send()
            .await
            .map_err(|e| QueueError::Acknowledge {
                message_id: message.id.clone(),
                reason: DisplayErrorContext(&e).to_string(),
            })?;

        Ok(())
    }
}

fn to_i32(value: u64) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
