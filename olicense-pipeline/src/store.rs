//! The published-snapshot store.
//!
//! A single slot holding an `Arc` to the current [`Snapshot`]. Publishing
//! swaps the pointer; readers clone the pointer and render from their own
//! reference, so the lock is only ever held for the swap or the clone.

use std::sync::Arc;

use olicense_types::Snapshot;
use parking_lot::RwLock;

/// Holds the most recently published snapshot.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: RwLock<Option<Arc<Snapshot>>>,
}

impl SnapshotStore {
    /// Create an empty store. Nothing is published until the first cycle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a fully built snapshot, replacing the previous one.
    pub fn replace(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        *self.current.write() = Some(snapshot.clone());
        snapshot
    }

    /// The latest published snapshot, or `None` before the first publish.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.read().clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.current.read().is_some()
    }
}
