//! Snapshot - the immutable unit of published metrics state.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::{NormalizedStatus, SchemaVersion};

/// Metadata about the scrape cycle that produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScrapeMetadata {
    /// Whether the cycle fetched and parsed the status successfully.
    pub succeeded: bool,

    /// Wall time spent in the cycle, in seconds. Never negative.
    pub duration_seconds: f64,

    /// Unix timestamp in milliseconds when the cycle finished.
    pub captured_at_ms: u64,
}

impl ScrapeMetadata {
    /// Metadata for a cycle finishing now.
    pub fn now(succeeded: bool, duration_seconds: f64) -> Self {
        Self {
            succeeded,
            duration_seconds: duration_seconds.max(0.0),
            captured_at_ms: current_timestamp_ms(),
        }
    }
}

/// A published view of the license server.
///
/// A snapshot either holds the status parsed by its own (successful) cycle,
/// or, after a failed cycle, the status of the last successful one. Only a
/// failure with no earlier success leaves `status` empty.
///
/// Snapshots are never mutated after publication; a new cycle produces a new
/// snapshot.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Snapshot {
    /// Schema version for forward compatibility.
    pub version: SchemaVersion,

    /// Poll cycle that produced this snapshot, starting at 1.
    pub sequence: u64,

    /// Parsed status, possibly carried over from an earlier cycle.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub status: Option<NormalizedStatus>,

    /// Outcome of the cycle that produced this snapshot.
    pub scrape: ScrapeMetadata,
}

impl Snapshot {
    /// Create a snapshot with the current schema version.
    pub fn new(sequence: u64, status: Option<NormalizedStatus>, scrape: ScrapeMetadata) -> Self {
        Self {
            version: SchemaVersion::current(),
            sequence,
            status,
            scrape,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.scrape.succeeded
    }

    pub fn status(&self) -> Option<&NormalizedStatus> {
        self.status.as_ref()
    }

    /// True when the data was carried over from an earlier cycle.
    pub fn is_stale(&self) -> bool {
        !self.scrape.succeeded && self.status.is_some()
    }
}

/// Current wall-clock time as Unix milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_snapshot_is_not_stale() {
        let status = NormalizedStatus::builder().total(10).build();
        let snapshot = Snapshot::new(1, Some(status), ScrapeMetadata::now(true, 0.2));

        assert!(snapshot.succeeded());
        assert!(!snapshot.is_stale());
        assert_eq!(snapshot.version, SchemaVersion::current());
    }

    #[test]
    fn failed_snapshot_with_data_is_stale() {
        let status = NormalizedStatus::builder().total(10).build();
        let snapshot = Snapshot::new(2, Some(status), ScrapeMetadata::now(false, 0.2));
        assert!(snapshot.is_stale());

        let empty = Snapshot::new(1, None, ScrapeMetadata::now(false, 0.2));
        assert!(!empty.is_stale());
        assert!(empty.status().is_none());
    }

    #[test]
    fn negative_duration_is_clamped() {
        let meta = ScrapeMetadata::now(true, -1.5);
        assert_eq!(meta.duration_seconds, 0.0);
        assert!(meta.captured_at_ms > 0);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_roundtrip() {
        let status = NormalizedStatus::builder()
            .total(100)
            .in_use(40)
            .feature("cad", |f| f.total(10).in_use(3))
            .build();
        let snapshot = Snapshot::new(3, Some(status), ScrapeMetadata::now(true, 0.01));

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, back);
    }
}
