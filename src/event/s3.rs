//! Wire shapes of S3 event notifications as delivered through SQS/SNS

use serde::Deserialize;

/// Field a pub/sub relay (SNS) uses to carry the original event as a JSON string
pub const RELAY_MESSAGE_FIELD: &str = "Message";

/// Collection key that marks a storage event
pub const RECORDS_FIELD: &str = "Records";

#[derive(Debug, Clone, Deserialize)]
pub struct S3EventRecord {
    #[serde(rename = "eventName", default)]
    pub event_name: Option<String>,
    pub s3: S3Entity,
}

impl S3EventRecord {
    pub fn is_removal(&self) -> bool {
        self.event_name
            .as_deref()
            .is_some_and(|name| name.starts_with("ObjectRemoved"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Entity {
    pub bucket: S3Bucket,
    pub object: S3Object,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Bucket {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Object {
    pub key: String,
}

/// S3 percent-encodes keys in notifications and writes spaces as `+`
pub fn decode_key(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(e) => {
            tracing::warn!(key = raw, error = %e, "Object key is not valid UTF-8 after decoding, using it verbatim");
            raw.to_string()
        }
    }
}
