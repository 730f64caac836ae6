//! Configuration management for the thumbnail worker
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use thumbnailer::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Thumbnails go to: {}/{}", config.thumbnail.bucket, config.thumbnail.prefix);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `THUMBNAILER__<section>__<key>`
//!
//! Examples:
//! - `THUMBNAILER__QUEUE__URL=https://sqs.us-east-1.amazonaws.com/123456789012/uploads`
//! - `THUMBNAILER__THUMBNAIL__MAX_WIDTH=300`
//! - `THUMBNAILER__THUMBNAIL__MAX_SOURCE_BYTES=10MB`
//!
//! The variable names of earlier deployments (`SQS_QUEUE_URL`, `THUMB_BUCKET`,
//! `THUMB_PREFIX`) are still read when the corresponding setting is unset.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/thumbnailer.toml`.
//! This can be overridden using the `THUMBNAILER_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

// Re-export public types
pub use crate::humanize::ByteSize;
pub use models::{
    Config, DEFAULT_THUMBNAIL_PREFIX, LogFormat, QueueConfig, StorageConfig, StorageProvider,
    TelemetryConfig, ThumbnailConfig, WorkerConfig,
};
pub use validation::ValidationError;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`THUMBNAILER__*`, then legacy names)
    /// 2. TOML file (default: `config/thumbnailer.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file is malformed
    /// - Validation fails (missing bucket or bounds, out-of-range limits)
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_path(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Check the settings only the polling worker needs
    pub fn validate_for_polling(&self) -> Result<(), ConfigError> {
        validation::validate_for_polling(self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[thumbnail]
bucket = "thumbs"
max_width = 300
max_height = 300
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.thumbnail.bucket, "thumbs");
        assert_eq!(config.thumbnail.prefix, DEFAULT_THUMBNAIL_PREFIX);
    }

    #[test]
    fn test_validation_catches_missing_bounds() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[thumbnail]
bucket = "thumbs"
max_width = 128
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::MissingBounds)
        ));
    }

    #[test]
    fn test_malformed_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[thumbnail\nbucket = ").unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(result.unwrap_err(), ConfigError::LoadError(_)));
    }

    #[test]
    fn test_full_config_example() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[queue]
url = "https://sqs.us-east-1.amazonaws.com/123456789012/raw-uploads"
region = "us-east-1"
wait_time_secs = 20
max_messages = 1
visibility_timeout_secs = 60

[storage]
provider = "s3"
region = "us-east-1"
endpoint = "http://localhost:4566"
allow_http = true

[thumbnail]
bucket = "thumbs"
prefix = "thumbnails/"
max_width = 300
max_height = 300
quality = 80
max_source_bytes = "20MB"

[worker]
idle_delay_ms = 1000

[telemetry]
health_addr = "0.0.0.0:9090"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();

        assert_eq!(config.queue.visibility_timeout_secs, Some(60));
        assert_eq!(config.storage.endpoint.as_deref(), Some("http://localhost:4566"));
        assert!(config.storage.allow_http);
        assert_eq!(config.thumbnail.max_source_bytes, ByteSize::mebibytes(20));
        assert_eq!(
            config.telemetry.health_addr.map(|addr| addr.port()),
            Some(9090)
        );
        assert!(config.validate_for_polling().is_ok());
    }
}
