//! Raw status source abstraction.
//!
//! The poller does not know how status text is obtained. Anything that can
//! produce one blob of status output per call implements [`StatusSource`];
//! the exporter binary ships a command runner and a file reader.

use std::fmt::Debug;

use async_trait::async_trait;
use olicense_status::StatusError;
use olicense_types::current_timestamp_ms;

/// One raw status observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStatus {
    /// Status output, as text.
    pub text: String,

    /// Unix timestamp in milliseconds when the text was captured.
    pub captured_at_ms: u64,
}

impl RawStatus {
    /// Wrap text captured just now.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            captured_at_ms: current_timestamp_ms(),
        }
    }
}

/// Trait for fetching raw status output.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use olicense_pipeline::{RawStatus, StatusSource};
/// use olicense_status::StatusError;
///
/// #[derive(Debug)]
/// struct Fixed(&'static str);
///
/// #[async_trait]
/// impl StatusSource for Fixed {
///     async fn fetch(&self) -> Result<RawStatus, StatusError> {
///         Ok(RawStatus::new(self.0))
///     }
///
///     fn description(&self) -> &str {
///         "fixed"
///     }
/// }
/// ```
#[async_trait]
pub trait StatusSource: Send + Sync + Debug {
    /// Fetch one status observation.
    ///
    /// Execution failures, non-zero exits, missing files and the like are
    /// reported as [`StatusError::SourceUnavailable`]. The future may be
    /// dropped at any await point when the poller times out or shuts down.
    async fn fetch(&self) -> Result<RawStatus, StatusError>;

    /// Returns a human-readable description of the source, for logs.
    fn description(&self) -> &str;
}
