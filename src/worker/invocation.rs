//! Single-invocation driver
//!
//! A function runtime hands over a batch of SQS records and deletes the ones
//! that are not reported back as failures. [`serve_lambda`] registers
//! [`handle_batch`] with the Lambda runtime; [`SqsBatchEvent::from_json`]
//! replays a captured event locally.

use aws_lambda_events::event::sqs::SqsEvent;
use lambda_runtime::{LambdaEvent, service_fn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::pipeline::{MessageOutcome, Pipeline};

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("Invalid SQS batch event: {0}")]
    InvalidEvent(#[from] serde_json::Error),
}

/// SQS batch event as delivered by the function runtime
#[derive(Debug, Clone, Deserialize)]
pub struct SqsBatchEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<SqsEventRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SqsEventRecord {
    #[serde(rename = "messageId")]
    pub message_id: String,
    #[serde(default)]
    pub body: String,
    #[serde(rename = "eventSource", default)]
    pub event_source: Option<String>,
}

impl SqsBatchEvent {
    pub fn from_json(input: &str) -> Result<Self, InvocationError> {
        Ok(serde_json::from_str(input)?)
    }
}

impl From<SqsEvent> for SqsBatchEvent {
    fn from(event: SqsEvent) -> Self {
        let records = event
            .records
            .into_iter()
            .map(|message| SqsEventRecord {
                message_id: message.message_id.unwrap_or_default(),
                body: message.body.unwrap_or_default(),
                event_source: message.event_source,
            })
            .collect();
        Self { records }
    }
}

/// Partial batch response: the listed records are redelivered
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResponse {
    #[serde(rename = "batchItemFailures")]
    pub batch_item_failures: Vec<BatchItemFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchItemFailure {
    #[serde(rename = "itemIdentifier")]
    pub item_identifier: String,
}

/// Run every record body through the pipeline
pub async fn handle_batch(pipeline: &Pipeline, event: SqsBatchEvent) -> BatchResponse {
    let metrics = pipeline.metrics();
    let mut response = BatchResponse::default();

    for record in event.records {
        metrics.message_received();
        if let Some(source) = record.event_source.as_deref().filter(|s| *s != "aws:sqs") {
            warn!(message_id = %record.message_id, source, "Record did not come from SQS");
        }
        match pipeline.process_message(&record.body).await {
            Ok(outcome) => {
                if outcome == MessageOutcome::NotStorageEvent {
                    metrics.message_unrecognized();
                }
                metrics.message_acknowledged();
                info!(message_id = %record.message_id, "Record processed");
            }
            Err(e) => {
                metrics.message_failed();
                error!(message_id = %record.message_id, error = %e, "Record failed");
                response.batch_item_failures.push(BatchItemFailure {
                    item_identifier: record.message_id,
                });
            }
        }
    }

    response
}

/// Serve [`handle_batch`] from the Lambda runtime until it shuts down
pub async fn serve_lambda(pipeline: Arc<Pipeline>) -> Result<(), lambda_runtime::Error> {
    lambda_runtime::run(service_fn(move |event: LambdaEvent<SqsEvent>| {
        let pipeline = pipeline.clone();
        async move {
            info!(
                request_id = %event.context.request_id,
                records = event.payload.records.len(),
                "Invocation received"
            );
            Ok::<_, lambda_runtime::Error>(handle_batch(&pipeline, event.payload.into()).await)
        }
    }))
    .await
}
