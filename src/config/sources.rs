use super::models::{Config, DEFAULT_THUMBNAIL_PREFIX};
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "THUMBNAILER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/thumbnailer.toml";
const ENV_PREFIX: &str = "THUMBNAILER";
const ENV_SEPARATOR: &str = "__";

/// Variable names used by earlier deployments of the worker
const LEGACY_QUEUE_URL: &str = "SQS_QUEUE_URL";
const LEGACY_THUMB_BUCKET: &str = "THUMB_BUCKET";
const LEGACY_THUMB_PREFIX: &str = "THUMB_PREFIX";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    load_from_path(default_path())
}

/// Same as [`load`] but with an explicit file location
pub fn load_from_path(config_path: PathBuf) -> Result<Config, ConfigError> {
    // Load .env file if it exists (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    let mut config = load_from_sources(config_path)?;
    apply_env_fallbacks(&mut config, |name| env::var(name).ok());
    Ok(config)
}

fn default_path() -> PathBuf {
    env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Fill gaps from legacy variable names and load storage secrets.
///
/// Legacy names only apply when the setting still has its default value.
/// Secrets are never stored in TOML files, only in environment.
fn apply_env_fallbacks(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if config.queue.url.is_none() {
        config.queue.url = lookup(LEGACY_QUEUE_URL);
    }
    if config.thumbnail.bucket.is_empty() {
        if let Some(bucket) = lookup(LEGACY_THUMB_BUCKET) {
            config.thumbnail.bucket = bucket;
        }
    }
    if config.thumbnail.prefix == DEFAULT_THUMBNAIL_PREFIX {
        if let Some(prefix) = lookup(LEGACY_THUMB_PREFIX) {
            config.thumbnail.prefix = prefix;
        }
    }

    config.storage.access_key = lookup("S3_ACCESS_KEY").or_else(|| lookup("AWS_ACCESS_KEY_ID"));
    config.storage.secret_key =
        lookup("S3_SECRET_KEY").or_else(|| lookup("AWS_SECRET_ACCESS_KEY"));
}

/// Load configuration from a specific path and environment
/// Useful for testing with custom config files
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    // Start with defaults (handled by struct Default implementations)
    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // THUMBNAILER__THUMBNAIL__MAX_WIDTH -> thumbnail.max_width
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.thumbnail.prefix, "thumbnails/");
        assert_eq!(config.queue.wait_time_secs, 20);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[queue]
url = "https://sqs.eu-west-1.amazonaws.com/123456789012/raw-images"
wait_time_secs = 10

[thumbnail]
bucket = "thumbs"
prefix = "small/"
max_width = 300
max_height = 300
quality = 85

[worker]
idle_delay_ms = 250
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.queue.wait_time_secs, 10);
        assert_eq!(config.thumbnail.bucket, "thumbs");
        assert_eq!(config.thumbnail.prefix, "small/");
        assert_eq!(config.thumbnail.quality, 85);
        assert_eq!(config.worker.idle_delay_ms, 250);
    }

    #[test]
    fn test_legacy_names_fill_gaps() {
        let mut config = Config::default();
        let lookup = lookup_from(&[
            ("SQS_QUEUE_URL", "https://sqs.local/queue"),
            ("THUMB_BUCKET", "legacy-thumbs"),
            ("THUMB_PREFIX", "thumbs/"),
            ("AWS_ACCESS_KEY_ID", "AKIA"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
        ]);

        apply_env_fallbacks(&mut config, lookup);

        assert_eq!(config.queue.url.as_deref(), Some("https://sqs.local/queue"));
        assert_eq!(config.thumbnail.bucket, "legacy-thumbs");
        assert_eq!(config.thumbnail.prefix, "thumbs/");
        assert_eq!(config.storage.access_key.as_deref(), Some("AKIA"));
        assert_eq!(config.storage.secret_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_explicit_settings_win_over_legacy_names() {
        let mut config = Config::default();
        config.queue.url = Some("https://sqs.local/configured".to_string());
        config.thumbnail.bucket = "configured".to_string();
        config.thumbnail.prefix = "configured/".to_string();
        let lookup = lookup_from(&[
            ("SQS_QUEUE_URL", "https://sqs.local/legacy"),
            ("THUMB_BUCKET", "legacy"),
            ("THUMB_PREFIX", "legacy/"),
            ("S3_ACCESS_KEY", "primary"),
            ("AWS_ACCESS_KEY_ID", "fallback"),
        ]);

        apply_env_fallbacks(&mut config, lookup);

        assert_eq!(config.queue.url.as_deref(), Some("https://sqs.local/configured"));
        assert_eq!(config.thumbnail.bucket, "configured");
        assert_eq!(config.thumbnail.prefix, "configured/");
        assert_eq!(config.storage.access_key.as_deref(), Some("primary"));
    }

    // Note: process-wide env::set_var is unsafe in edition 2024, so the
    // environment is injected through `apply_env_fallbacks` instead.
}
