use crate::humanize::ByteSize;
use crate::thumbnail::{DEFAULT_JPEG_QUALITY, ThumbnailBounds};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_THUMBNAIL_PREFIX: &str = "thumbnails/";

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub thumbnail: ThumbnailConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Source queue (SQS) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Queue URL; required by the polling worker only
    pub url: Option<String>,
    pub region: Option<String>,
    /// Alternative endpoint (e.g. LocalStack)
    pub endpoint: Option<String>,
    /// Long-poll wait per receive call
    #[serde(default = "default_wait_time_secs")]
    pub wait_time_secs: u64,
    #[serde(default = "default_max_messages")]
    pub max_messages: u32,
    /// Overrides the queue's visibility timeout for received messages
    pub visibility_timeout_secs: Option<u32>,
}

impl QueueConfig {
    pub fn wait_time(&self) -> Duration {
        Duration::from_secs(self.wait_time_secs)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: None,
            region: None,
            endpoint: None,
            wait_time_secs: default_wait_time_secs(),
            max_messages: default_max_messages(),
            visibility_timeout_secs: None,
        }
    }
}

fn default_wait_time_secs() -> u64 {
    20
}

fn default_max_messages() -> u32 {
    1
}

/// Storage provider type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    #[default]
    S3,
    Local,
}

/// Storage configuration shared by source and destination buckets
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    #[serde(default)]
    pub allow_http: bool,
    /// Base directory of the local provider
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// S3 access key (loaded from environment, not from config file)
    #[serde(skip)]
    pub access_key: Option<String>,
    /// S3 secret key (loaded from environment, not from config file)
    #[serde(skip)]
    pub secret_key: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::default(),
            region: None,
            endpoint: None,
            allow_http: false,
            root: default_storage_root(),
            access_key: None,
            secret_key: None,
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("data/objects")
}

/// Thumbnail output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThumbnailConfig {
    /// Destination bucket
    #[serde(default)]
    pub bucket: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Deployments disagree on the bound, so there is no default
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    #[serde(default = "default_quality")]
    pub quality: u8,
    #[serde(default = "default_max_source_bytes")]
    pub max_source_bytes: ByteSize,
}

impl ThumbnailConfig {
    /// `None` until both edges are configured
    pub fn bounds(&self) -> Option<ThumbnailBounds> {
        match (self.max_width, self.max_height) {
            (Some(width), Some(height)) => Some(ThumbnailBounds::new(width, height)),
            _ => None,
        }
    }
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            prefix: default_prefix(),
            max_width: None,
            max_height: None,
            quality: default_quality(),
            max_source_bytes: default_max_source_bytes(),
        }
    }
}

fn default_prefix() -> String {
    DEFAULT_THUMBNAIL_PREFIX.to_string()
}

fn default_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

fn default_max_source_bytes() -> ByteSize {
    ByteSize::mebibytes(25)
}

/// Polling worker configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Pause between loop iterations
    #[serde(default = "default_idle_delay_ms")]
    pub idle_delay_ms: u64,
}

impl WorkerConfig {
    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            idle_delay_ms: default_idle_delay_ms(),
        }
    }
}

fn default_idle_delay_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Telemetry configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Serve `/health` and `/metrics` here when set
    pub health_addr: Option<SocketAddr>,
    #[serde(default)]
    pub log_format: LogFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.queue.wait_time(), Duration::from_secs(20));
        assert_eq!(config.queue.max_messages, 1);
        assert_eq!(config.storage.provider, StorageProvider::S3);
        assert_eq!(config.thumbnail.prefix, "thumbnails/");
        assert_eq!(config.thumbnail.quality, 75);
        assert_eq!(config.thumbnail.max_source_bytes, ByteSize::mebibytes(25));
        assert_eq!(config.worker.idle_delay(), Duration::from_secs(1));
        assert!(config.telemetry.health_addr.is_none());
    }

    #[test]
    fn test_bounds_need_both_edges() {
        let mut thumbnail = ThumbnailConfig::default();
        assert!(thumbnail.bounds().is_none());

        thumbnail.max_width = Some(300);
        assert!(thumbnail.bounds().is_none());

        thumbnail.max_height = Some(200);
        assert_eq!(thumbnail.bounds(), Some(ThumbnailBounds::new(300, 200)));
    }

    #[test]
    fn test_deserialize_from_toml() {
        let config: Config = toml::from_str(
            r#"
[queue]
url = "https://sqs.us-east-1.amazonaws.com/123456789012/uploads"
max_messages = 5

[storage]
provider = "local"
root = "/var/lib/thumbnailer"

[thumbnail]
bucket = "thumbs"
max_width = 128
max_height = 128
max_source_bytes = "10MB"

[telemetry]
health_addr = "127.0.0.1:9000"
log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.queue.max_messages, 5);
        assert_eq!(config.storage.provider, StorageProvider::Local);
        assert_eq!(config.thumbnail.bounds(), Some(ThumbnailBounds::square(128)));
        assert_eq!(config.thumbnail.max_source_bytes, ByteSize::mebibytes(10));
        assert_eq!(config.telemetry.log_format, LogFormat::Json);
    }
}
