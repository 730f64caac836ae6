use super::models::Config;
use thiserror::Error;

/// SQS receive limits
const MAX_RECEIVE_BATCH: u32 = 10;
const MAX_WAIT_TIME_SECS: u64 = 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Destination bucket is not configured (thumbnail.bucket or THUMB_BUCKET)")]
    MissingDestinationBucket,

    #[error("Thumbnail prefix must not be empty: every key would count as already processed")]
    EmptyPrefix,

    #[error("Thumbnail bounds are required: set thumbnail.max_width and thumbnail.max_height")]
    MissingBounds,

    #[error("Thumbnail bounds must be positive: {width}x{height}")]
    InvalidBounds { width: u32, height: u32 },

    #[error("JPEG quality must be within 1..=100, got {0}")]
    InvalidQuality(u8),

    #[error("max_source_bytes must be positive")]
    InvalidSourceLimit,

    #[error("queue.max_messages must be within 1..=10, got {0}")]
    InvalidBatchSize(u32),

    #[error("queue.wait_time_secs must not exceed 20, got {0}")]
    InvalidWaitTime(u64),

    #[error("Queue URL is not configured (queue.url or SQS_QUEUE_URL)")]
    MissingQueueUrl,
}

/// Validate everything the thumbnail pipeline needs
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_thumbnail(config)?;
    validate_queue_limits(config)?;
    Ok(())
}

/// Additional requirements of the polling worker
pub fn validate_for_polling(config: &Config) -> Result<(), ValidationError> {
    validate(config)?;

    match config.queue.url.as_deref() {
        Some(url) if !url.trim().is_empty() => Ok(()),
        _ => Err(ValidationError::MissingQueueUrl),
    }
}

fn validate_thumbnail(config: &Config) -> Result<(), ValidationError> {
    let thumbnail = &config.thumbnail;

    if thumbnail.bucket.trim().is_empty() {
        return Err(ValidationError::MissingDestinationBucket);
    }

    if thumbnail.prefix.is_empty() {
        return Err(ValidationError::EmptyPrefix);
    }

    let (Some(width), Some(height)) = (thumbnail.max_width, thumbnail.max_height) else {
        return Err(ValidationError::MissingBounds);
    };
    if width == 0 || height == 0 {
        return Err(ValidationError::InvalidBounds { width, height });
    }

    if !(1..=100).contains(&thumbnail.quality) {
        return Err(ValidationError::InvalidQuality(thumbnail.quality));
    }

    if thumbnail.max_source_bytes.as_u64() == 0 {
        return Err(ValidationError::InvalidSourceLimit);
    }

    Ok(())
}

fn validate_queue_limits(config: &Config) -> Result<(), ValidationError> {
    let queue = &config.queue;

    if !(1..=MAX_RECEIVE_BATCH).contains(&queue.max_messages) {
        return Err(ValidationError::InvalidBatchSize(queue.max_messages));
    }

    if queue.wait_time_secs > MAX_WAIT_TIME_SECS {
        return Err(ValidationError::InvalidWaitTime(queue.wait_time_secs));
    }

    Ok(())
}
