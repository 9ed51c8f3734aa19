// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log messages flowing through the stream strategy, and the sources they originate from.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Latency observed between ingestion and sending, aggregated per log source.
#[derive(Debug, Default)]
pub struct LatencyStats {
    inner: Mutex<LatencyWindow>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LatencyWindow {
    pub count: u64,
    pub total: Duration,
    pub max: Duration,
}

impl LatencyWindow {
    #[must_use]
    pub fn average(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        let avg_nanos = self.total.as_nanos() / u128::from(self.count);
        Duration::from_nanos(u64::try_from(avg_nanos).unwrap_or(u64::MAX))
    }
}

impl LatencyStats {
    pub fn add(&self, latency: Duration) {
        let mut window = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        window.count += 1;
        window.total = window.total.saturating_add(latency);
        window.max = window.max.max(latency);
    }

    #[must_use]
    pub fn snapshot(&self) -> LatencyWindow {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A configured source of logs (a file, a socket, a container...).
#[derive(Debug, Default)]
pub struct LogSource {
    pub name: String,
    pub latency_stats: LatencyStats,
}

impl LogSource {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            latency_stats: LatencyStats::default(),
        }
    }
}

/// Where a message was read from.
#[derive(Debug, Clone)]
pub struct Origin {
    pub identifier: String,
    pub log_source: Arc<LogSource>,
}

impl Origin {
    #[must_use]
    pub fn new(identifier: impl Into<String>, log_source: Arc<LogSource>) -> Self {
        Self {
            identifier: identifier.into(),
            log_source,
        }
    }
}

/// Everything about a message except its content.
///
/// Payloads keep one of these per item instead of the item itself, so an in-flight payload does
/// not retain message contents.
#[derive(Debug, Clone, Default)]
pub struct MessageMetadata {
    pub origin: Option<Origin>,
    pub status: String,
    /// Unix timestamp in nanoseconds at which the message entered the pipeline.
    pub ingestion_timestamp: i64,
    /// Size in bytes of the item's rendered content.
    pub raw_data_len: usize,
}

#[derive(Debug, Clone)]
pub struct Message {
    content: Vec<u8>,
    pub metadata: MessageMetadata,
}

pub(crate) fn unix_nanos_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

impl Message {
    /// Creates a message ingested now.
    #[must_use]
    pub fn new(content: Vec<u8>, origin: Option<Origin>, status: impl Into<String>) -> Self {
        Self::with_ingestion_timestamp(content, origin, status, unix_nanos_now())
    }

    #[must_use]
    pub fn with_ingestion_timestamp(
        content: Vec<u8>,
        origin: Option<Origin>,
        status: impl Into<String>,
        ingestion_timestamp: i64,
    ) -> Self {
        let raw_data_len = content.len();
        Self {
            content,
            metadata: MessageMetadata {
                origin,
                status: status.into(),
                ingestion_timestamp,
                raw_data_len,
            },
        }
    }

    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Time elapsed since ingestion. Zero if the ingestion timestamp is in the future.
    #[must_use]
    pub fn latency(&self) -> Duration {
        let elapsed = unix_nanos_now().saturating_sub(self.metadata.ingestion_timestamp);
        Duration::from_nanos(u64::try_from(elapsed).unwrap_or(0))
    }

    /// Splits the message, dropping its content.
    #[must_use]
    pub fn into_metadata(self) -> MessageMetadata {
        self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_stats_window() {
        let stats = LatencyStats::default();
        assert_eq!(stats.snapshot().average(), Duration::ZERO);

        stats.add(Duration::from_millis(10));
        stats.add(Duration::from_millis(30));

        let window = stats.snapshot();
        assert_eq!(window.count, 2);
        assert_eq!(window.total, Duration::from_millis(40));
        assert_eq!(window.max, Duration::from_millis(30));
        assert_eq!(window.average(), Duration::from_millis(20));
    }

    #[test]
    fn test_message_metadata_tracks_content_len() {
        let msg = Message::new(b"hello world".to_vec(), None, "info");
        assert_eq!(msg.metadata.raw_data_len, 11);
        assert_eq!(msg.metadata.status, "info");
        assert_eq!(msg.content(), b"hello world");
    }

    #[test]
    fn test_message_latency() {
        let one_second_ago = unix_nanos_now() - 1_000_000_000;
        let msg = Message::with_ingestion_timestamp(b"x".to_vec(), None, "info", one_second_ago);
        assert!(msg.latency() >= Duration::from_secs(1));

        let future = unix_nanos_now() + 60_000_000_000;
        let msg = Message::with_ingestion_timestamp(b"x".to_vec(), None, "info", future);
        assert_eq!(msg.latency(), Duration::ZERO);
    }

    #[test]
    fn test_origin_shares_log_source() {
        let source = Arc::new(LogSource::new("nginx"));
        let origin = Origin::new("file:/var/log/nginx/access.log", Arc::clone(&source));
        let meta = Message::new(b"GET /".to_vec(), Some(origin), "info").into_metadata();

        meta.origin
            .as_ref()
            .expect("origin")
            .log_source
            .latency_stats
            .add(Duration::from_millis(5));
        assert_eq!(source.latency_stats.snapshot().count, 1);
    }
}
