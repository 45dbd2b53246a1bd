//! Snapshot construction from scrape outcomes.

use olicense_types::{NormalizedStatus, ScrapeMetadata, Snapshot};

/// Build the snapshot for a successful cycle.
pub fn build(status: NormalizedStatus, duration_seconds: f64, sequence: u64) -> Snapshot {
    Snapshot::new(
        sequence,
        Some(status),
        ScrapeMetadata::now(true, duration_seconds),
    )
}

/// Build the snapshot for a failed cycle.
///
/// The previous snapshot's status is carried forward unchanged so that
/// metrics neither disappear nor drop to zero on a transient failure; only
/// the scrape metadata is fresh. Without a previous snapshot the status is
/// absent.
pub fn build_failure(previous: Option<&Snapshot>, duration_seconds: f64, sequence: u64) -> Snapshot {
    Snapshot::new(
        sequence,
        previous.and_then(|s| s.status.clone()),
        ScrapeMetadata::now(false, duration_seconds),
    )
}
