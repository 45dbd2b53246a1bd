//! # olicense-types
//!
//! Core types shared by the OLicense exporter crates. This crate defines the
//! format-independent view of one license-server status observation and the
//! immutable snapshot that the exporter publishes to its HTTP readers.
//!
//! ## Design Goals
//!
//! - **Zero required dependencies**: Core types work without any serialization framework
//! - **Optional serialization**: Enable the `serde` feature as needed
//! - **Versioned schema**: Snapshots include version info and a publication sequence
//! - **Ergonomic builders**: Fluent API for constructing statuses in tests and tools
//!
//! ## Example
//!
//! ```rust
//! use olicense_types::NormalizedStatus;
//!
//! let status = NormalizedStatus::builder()
//!     .total(100)
//!     .in_use(40)
//!     .denials(2)
//!     .feature("cad", |f| f.total(10).in_use(3))
//!     .build();
//!
//! assert_eq!(status.licenses_available, 60);
//! assert_eq!(status.features.len(), 1);
//! ```
//!
//! ## Schema Version
//!
//! The current schema version is **1**.

mod label;
mod snapshot;
mod status;
mod version;

pub use label::*;
pub use snapshot::*;
pub use status::*;
pub use version::*;

/// Current schema version.
///
/// Increment this when making breaking changes to the snapshot format.
pub const SCHEMA_VERSION: u32 = 1;
