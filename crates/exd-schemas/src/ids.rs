//! Local order-id generation and timestamp formatting.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};

/// Mints human-readable, monotonically ordered identifiers of the form
/// `ORD_<epoch_ms>_<6-digit-counter>`.
///
/// The millisecond prefix orders ids across process generations; the counter
/// orders them within one. The counter is process-wide per generator, so two
/// ids minted in the same millisecond still differ.
#[derive(Debug)]
pub struct OrderIdGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl OrderIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }

    pub fn next_id(&self) -> String {
        let epoch_ms = Utc::now().timestamp_millis();
        let seq = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{}_{}_{:06}", self.prefix, epoch_ms, seq)
    }
}

impl Default for OrderIdGenerator {
    fn default() -> Self {
        Self::new("ORD")
    }
}

/// ISO-8601 UTC with millisecond precision — the one timestamp format every
/// persisted and serialized value uses.
pub fn iso_millis(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a timestamp previously produced by [`iso_millis`].
pub fn parse_iso_millis(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
