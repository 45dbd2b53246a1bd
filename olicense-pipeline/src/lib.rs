//! # olicense-pipeline
//!
//! The moving parts of the exporter: a [`Poller`] that periodically reads
//! raw status from a [`StatusSource`], parses it, and publishes a
//! [`Snapshot`] into a [`SnapshotStore`]; and a Prometheus endpoint that
//! renders whatever snapshot is current.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use olicense_pipeline::prometheus::{PrometheusConfig, PrometheusExporter};
//! use olicense_pipeline::{Poller, SnapshotStore, StatusSource};
//!
//! # async fn example(source: Arc<dyn StatusSource>) -> std::io::Result<()> {
//! let store = Arc::new(SnapshotStore::new());
//!
//! let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
//! let server = PrometheusExporter::new(PrometheusConfig::default(), store.clone())
//!     .start_server(stop_rx)
//!     .await?;
//!
//! let poller = Poller::builder(source, store)
//!     .interval(Duration::from_secs(15))
//!     .build()
//!     .unwrap()
//!     .start();
//!
//! // ... on shutdown ...
//! poller.shutdown(Duration::from_secs(30)).await;
//! let _ = stop_tx.send(true);
//! server.join().await;
//! # Ok(())
//! # }
//! ```
//!
//! The poller and the HTTP handlers only meet at the store, which hands out
//! whole snapshots. A request never waits for a poll cycle.

mod builder;
mod poller;
mod source;
mod store;

pub mod prometheus;

pub use builder::{build, build_failure};
pub use poller::{PollPhase, Poller, PollerBuilder, PollerConfigError, PollerHandle};
pub use source::{RawStatus, StatusSource};
pub use store::SnapshotStore;

// Re-export types for convenience
pub use olicense_types::{NormalizedStatus, ScrapeMetadata, Snapshot};
