//! Event unwrapping: queue message body -> object references
//!
//! A body is either a direct S3 event (`{"Records": [...]}`) or an SNS
//! relay envelope whose `Message` field holds the S3 event as a JSON string.
//! Bodies without a `Records` collection are not storage events and are
//! reported as [`UnwrappedEvent::NotStorageEvent`] rather than as errors.

pub mod s3;

use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use s3::{RECORDS_FIELD, RELAY_MESSAGE_FIELD, S3EventRecord};

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Message body is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Relay envelope does not carry a JSON event: {0}")]
    InvalidEnvelope(String),

    #[error("'Records' is not an array")]
    InvalidRecords,
}

pub type Result<T> = std::result::Result<T, EventError>;

/// One storage object named by an event
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Final path component of the key
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Key is already under the thumbnail prefix
    AlreadyThumbnail,
    /// Key names a folder placeholder, not a file
    FolderMarker,
    /// Notification reports a deletion
    RemovalEvent,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::AlreadyThumbnail => "already a thumbnail",
            SkipReason::FolderMarker => "folder marker",
            SkipReason::RemovalEvent => "removal event",
        };
        f.write_str(reason)
    }
}

/// Guard applied to every reference before any I/O
pub fn skip_reason(object: &ObjectRef, destination_prefix: &str) -> Option<SkipReason> {
    if object.key.starts_with(destination_prefix) {
        Some(SkipReason::AlreadyThumbnail)
    } else if object.key.ends_with('/') {
        Some(SkipReason::FolderMarker)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedObject {
    pub object: ObjectRef,
    pub reason: SkipReason,
}

/// Record that could not be read as an S3 record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRecord {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventRecords {
    pub objects: Vec<ObjectRef>,
    pub skipped: Vec<SkippedObject>,
    pub malformed: Vec<MalformedRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnwrappedEvent {
    NotStorageEvent,
    Records(EventRecords),
}

/// Turns queue message bodies into object references
#[derive(Debug, Clone)]
pub struct EventUnwrapper {
    destination_prefix: String,
}

impl EventUnwrapper {
    pub fn new(destination_prefix: impl Into<String>) -> Self {
        Self {
            destination_prefix: destination_prefix.into(),
        }
    }

    pub fn unwrap(&self, body: &str) -> Result<UnwrappedEvent> {
        let parsed: Value = serde_json::from_str(body).map_err(EventError::InvalidJson)?;
        let event = unwrap_envelope(parsed)?;

        let Some(records) = event.get(RECORDS_FIELD) else {
            tracing::warn!(event = %truncate(&event.to_string()), "Skipping message, not a storage event");
            return Ok(UnwrappedEvent::NotStorageEvent);
        };
        let Value::Array(records) = records else {
            return Err(EventError::InvalidRecords);
        };

        let mut unwrapped = EventRecords::default();
        for (index, raw) in records.iter().enumerate() {
            let record = match S3EventRecord::deserialize(raw) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(index, error = %e, "Malformed storage event record");
                    unwrapped.malformed.push(MalformedRecord {
                        index,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let object = ObjectRef::new(record.s3.bucket.name.clone(), s3::decode_key(&record.s3.object.key));
            let reason = if record.is_removal() {
                Some(SkipReason::RemovalEvent)
            } else {
                skip_reason(&object, &self.destination_prefix)
            };

            match reason {
                Some(reason) => {
                    tracing::info!(bucket = %object.bucket, key = %object.key, %reason, "Skipping object");
                    unwrapped.skipped.push(SkippedObject { object, reason });
                }
                None => unwrapped.objects.push(object),
            }
        }

        Ok(UnwrappedEvent::Records(unwrapped))
    }
}

/// Peel one relay layer if present
fn unwrap_envelope(mut body: Value) -> Result<Value> {
    let Some(message) = body
        .as_object_mut()
        .and_then(|fields| fields.remove(RELAY_MESSAGE_FIELD))
    else {
        return Ok(body);
    };

    match message {
        Value::String(inner) => {
            serde_json::from_str(&inner).map_err(|e| EventError::InvalidEnvelope(e.to_string()))
        }
        Value::Object(inner) => Ok(Value::Object(inner)),
        other => Err(EventError::InvalidEnvelope(format!(
            "'{}' holds {}",
            RELAY_MESSAGE_FIELD,
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn truncate(text: &str) -> &str {
    const LIMIT: usize = 256;
    match text.char_indices().nth(LIMIT) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
