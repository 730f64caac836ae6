//! Observability (tracing setup, metrics counters)

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, TelemetryConfig};

const DEFAULT_FILTER: &str = "info";

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the default `info` filter. Events go to
/// stderr so that stdout stays free for command output.
pub fn init_tracing(config: &TelemetryConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    messages_received: AtomicU64,
    messages_acknowledged: AtomicU64,
    messages_failed: AtomicU64,
    messages_unrecognized: AtomicU64,
    thumbnails_written: AtomicU64,
    objects_skipped: AtomicU64,
    objects_failed: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_received(&self) {
        increment(&self.messages_received, "messages_received", 1);
    }

    pub fn message_acknowledged(&self) {
        increment(&self.messages_acknowledged, "messages_acknowledged", 1);
    }

    pub fn message_failed(&self) {
        increment(&self.messages_failed, "messages_failed", 1);
    }

    pub fn message_unrecognized(&self) {
        increment(&self.messages_unrecognized, "messages_unrecognized", 1);
    }

    pub fn thumbnail_written(&self) {
        increment(&self.thumbnails_written, "thumbnails_written", 1);
    }

    pub fn objects_skipped(&self, count: usize) {
        increment(&self.objects_skipped, "objects_skipped", count as u64);
    }

    pub fn objects_failed(&self, count: usize) {
        increment(&self.objects_failed, "objects_failed", count as u64);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_acknowledged: self.messages_acknowledged.load(Ordering::Relaxed),
            messages_failed: self.messages_failed.load(Ordering::Relaxed),
            messages_unrecognized: self.messages_unrecognized.load(Ordering::Relaxed),
            thumbnails_written: self.thumbnails_written.load(Ordering::Relaxed),
            objects_skipped: self.objects_skipped.load(Ordering::Relaxed),
            objects_failed: self.objects_failed.load(Ordering::Relaxed),
        }
    }
}

fn increment(counter: &AtomicU64, name: &'static str, by: u64) {
    if by == 0 {
        return;
    }
    counter.fetch_add(by, Ordering::Relaxed);
    tracing::debug!(counter = name, by, "Metric incremented");
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub messages_acknowledged: u64,
    pub messages_failed: u64,
    pub messages_unrecognized: u64,
    pub thumbnails_written: u64,
    pub objects_skipped: u64,
    pub objects_failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = Metrics::new();
        metrics.message_received();
        metrics.message_received();
        metrics.message_acknowledged();
        metrics.objects_skipped(3);
        metrics.objects_failed(0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.messages_received, 2);
        assert_eq!(snapshot.messages_acknowledged, 1);
        assert_eq!(snapshot.objects_skipped, 3);
        assert_eq!(snapshot.objects_failed, 0);
    }

    #[test]
    fn test_snapshot_serializes_by_name() {
        let metrics = Metrics::new();
        metrics.thumbnail_written();

        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["thumbnails_written"], 1);
        assert_eq!(json["messages_failed"], 0);
    }
}
