//! Thumbnail pipeline
//!
//! [`Pipeline::process_object`] handles one object reference: guard, fetch,
//! transform, deliver. [`Pipeline::process_message`] applies it to every
//! reference of a queue message body, isolating failures per reference so
//! one bad object never stops its siblings. A message is complete only when
//! every reference succeeded or was skipped.

use bon::bon;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_THUMBNAIL_PREFIX, ThumbnailConfig, ValidationError};
use crate::event::{EventError, EventUnwrapper, ObjectRef, SkipReason, SkippedObject, UnwrappedEvent, skip_reason};
use crate::humanize::ByteSize;
use crate::observability::Metrics;
use crate::storage::{ObjectStorage, StorageError};
use crate::thumbnail::{Thumbnailer, TransformError};

/// Per-object failure
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to fetch {object}: {source}")]
    Fetch {
        object: ObjectRef,
        #[source]
        source: StorageError,
    },

    #[error("Source {object} is {size} bytes, limit is {limit}")]
    SourceTooLarge {
        object: ObjectRef,
        size: u64,
        limit: ByteSize,
    },

    #[error("Failed to transform {object}: {source}")]
    Transform {
        object: ObjectRef,
        #[source]
        source: TransformError,
    },

    #[error("Failed to deliver {bucket}/{key}: {source}")]
    Delivery {
        bucket: String,
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("Record {index} is malformed: {reason}")]
    MalformedRecord { index: usize, reason: String },
}

/// Per-message failure; the message must not be acknowledged
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("Unreadable event: {0}")]
    Event(#[from] EventError),

    #[error("{} of {attempted} records failed", .failures.len())]
    Incomplete {
        attempted: usize,
        failures: Vec<PipelineError>,
        report: MessageReport,
    },
}

/// A thumbnail that was written to the destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenThumbnail {
    pub source: ObjectRef,
    pub destination: ObjectRef,
    pub width: u32,
    pub height: u32,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectOutcome {
    Written(WrittenThumbnail),
    Skipped(SkipReason),
}

/// What happened to the references of one message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageReport {
    pub written: Vec<WrittenThumbnail>,
    pub skipped: Vec<SkippedObject>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Body carried no storage event; nothing to do
    NotStorageEvent,
    Processed(MessageReport),
}

/// Destination key: prefix followed by the final path component of the source key
pub fn thumbnail_key(prefix: &str, object: &ObjectRef) -> String {
    format!("{prefix}{}", object.file_name())
}

/// Message-to-thumbnail pipeline shared by the poller and the invocation driver
pub struct Pipeline {
    storage: Arc<dyn ObjectStorage>,
    destination_bucket: String,
    destination_prefix: String,
    thumbnailer: Thumbnailer,
    max_source_bytes: ByteSize,
    unwrapper: EventUnwrapper,
    metrics: Arc<Metrics>,
}

#[bon]
impl Pipeline {
    #[builder]
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        #[builder(into)] destination_bucket: String,
        #[builder(into, default = DEFAULT_THUMBNAIL_PREFIX.to_string())] destination_prefix: String,
        thumbnailer: Thumbnailer,
        #[builder(default = ByteSize::mebibytes(25))] max_source_bytes: ByteSize,
        #[builder(default)] metrics: Arc<Metrics>,
    ) -> Self {
        let unwrapper = EventUnwrapper::new(destination_prefix.clone());
        Self {
            storage,
            destination_bucket,
            destination_prefix,
            thumbnailer,
            max_source_bytes,
            unwrapper,
            metrics,
        }
    }
}

impl Pipeline {
    /// Build from the `[thumbnail]` section
    pub fn from_config(
        config: &ThumbnailConfig,
        storage: Arc<dyn ObjectStorage>,
        metrics: Arc<Metrics>,
    ) -> Result<Self, ValidationError> {
        let bounds = config.bounds().ok_or(ValidationError::MissingBounds)?;

        Ok(Self::builder()
            .storage(storage)
            .destination_bucket(config.bucket.clone())
            .destination_prefix(config.prefix.clone())
            .thumbnailer(Thumbnailer::new(bounds, config.quality))
            .max_source_bytes(config.max_source_bytes)
            .metrics(metrics)
            .build())
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn destination_bucket(&self) -> &str {
        &self.destination_bucket
    }

    pub fn destination_prefix(&self) -> &str {
        &self.destination_prefix
    }

    /// Guard, fetch, transform and deliver one object
    pub async fn process_object(&self, object: &ObjectRef) -> Result<ObjectOutcome, PipelineError> {
        if let Some(reason) = skip_reason(object, &self.destination_prefix) {
            debug!(bucket = %object.bucket, key = %object.key, %reason, "Skipping object");
            self.metrics.objects_skipped(1);
            return Ok(ObjectOutcome::Skipped(reason));
        }

        match self.render_and_deliver(object).await {
            Ok(written) => {
                self.metrics.thumbnail_written();
                Ok(ObjectOutcome::Written(written))
            }
            Err(e) => {
                self.metrics.objects_failed(1);
                Err(e)
            }
        }
    }

    async fn render_and_deliver(&self, object: &ObjectRef) -> Result<WrittenThumbnail, PipelineError> {
        info!(bucket = %object.bucket, key = %object.key, "Fetching source image");
        let source = self
            .storage
            .download_bounded(&object.bucket, &object.key, self.max_source_bytes)
            .await
            .map_err(|source| match source {
                StorageError::TooLarge { size, limit, .. } => PipelineError::SourceTooLarge {
                    object: object.clone(),
                    size,
                    limit,
                },
                source => PipelineError::Fetch {
                    object: object.clone(),
                    source,
                },
            })?;

        let thumbnail = self
            .thumbnailer
            .render_blocking(source)
            .await
            .map_err(|source| PipelineError::Transform {
                object: object.clone(),
                source,
            })?;

        let key = thumbnail_key(&self.destination_prefix, object);
        let size = thumbnail.bytes.len();
        self.storage
            .upload(
                &self.destination_bucket,
                &key,
                thumbnail.bytes,
                mime::IMAGE_JPEG.as_ref(),
            )
            .await
            .map_err(|source| PipelineError::Delivery {
                bucket: self.destination_bucket.clone(),
                key: key.clone(),
                source,
            })?;

        info!(
            bucket = %object.bucket,
            key = %object.key,
            thumbnail_key = %key,
            width = thumbnail.width,
            height = thumbnail.height,
            size,
            "Thumbnail written"
        );

        Ok(WrittenThumbnail {
            source: object.clone(),
            destination: ObjectRef::new(self.destination_bucket.clone(), key),
            width: thumbnail.width,
            height: thumbnail.height,
            size,
        })
    }

    /// Process every reference carried by a queue message body.
    ///
    /// `Ok` means the message may be acknowledged.
    pub async fn process_message(&self, body: &str) -> Result<MessageOutcome, MessageError> {
        let records = match self.unwrapper.unwrap(body)? {
            UnwrappedEvent::NotStorageEvent => return Ok(MessageOutcome::NotStorageEvent),
            UnwrappedEvent::Records(records) => records,
        };

        let attempted = records.objects.len() + records.malformed.len();
        self.metrics.objects_skipped(records.skipped.len());
        self.metrics.objects_failed(records.malformed.len());

        let mut report = MessageReport {
            written: Vec::new(),
            skipped: records.skipped,
        };
        let mut failures: Vec<PipelineError> = records
            .malformed
            .into_iter()
            .map(|record| PipelineError::MalformedRecord {
                index: record.index,
                reason: record.reason,
            })
            .collect();

        for object in records.objects {
            match self.process_object(&object).await {
                Ok(ObjectOutcome::Written(written)) => report.written.push(written),
                Ok(ObjectOutcome::Skipped(reason)) => {
                    report.skipped.push(SkippedObject { object, reason })
                }
                Err(e) => {
                    warn!(bucket = %object.bucket, key = %object.key, error = %e, "Object failed");
                    failures.push(e);
                }
            }
        }

        if failures.is_empty() {
            Ok(MessageOutcome::Processed(report))
        } else {
            Err(MessageError::Incomplete {
                attempted,
                failures,
                report,
            })
        }
    }
}
