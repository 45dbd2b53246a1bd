//! # olicense-status
//!
//! Turns raw OLicense Server status output into a [`NormalizedStatus`].
//!
//! The status command may print either a JSON document or a free-text
//! report, depending on server version and flags. [`detect`] decides which
//! one a blob is, and [`parse_status`] runs the matching parser.
//!
//! ## Quick Start
//!
//! ```rust
//! use olicense_status::{parse_status, StatusFormat};
//!
//! let raw = r#"{"total":100,"inUse":40,"denials":2,"features":[{"name":"cad","total":10,"inUse":3,"denials":0}]}"#;
//! let parsed = parse_status(raw, None).unwrap();
//!
//! assert_eq!(parsed.format, StatusFormat::Structured);
//! assert_eq!(parsed.status.licenses_available, 60);
//! assert!(parsed.warnings.is_empty());
//! ```
//!
//! ## Error handling
//!
//! Problems with the whole observation are returned as [`StatusError`].
//! Problems with individual fields or rows are collected as
//! [`ParseWarning`]s and never fail the parse. A field that is negative or
//! not a number takes the value from `previous` (the last good status) or
//! zero.

mod detect;
mod error;
mod fields;
mod heartbeat;
mod structured;
mod tabular;

pub use detect::{detect, StatusFormat};
pub use error::{FieldFallback, ParseWarning, StatusError};

// Re-export types for convenience
pub use olicense_types::{FeatureStatus, NormalizedStatus};

use detect::Detected;
use fields::ParseContext;

/// A successfully parsed status observation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedStatus {
    /// Which parser produced the status.
    pub format: StatusFormat,
    pub status: NormalizedStatus,
    /// Non-fatal problems found along the way.
    pub warnings: Vec<ParseWarning>,
}

/// Detect the format of `raw` and parse it.
///
/// `previous` is the last successfully parsed status, used to fill in
/// individual fields that cannot be read this time.
///
/// # Errors
///
/// - [`StatusError::EmptyStatus`] if `raw` is blank, or is a report with no
///   recognisable totals or feature rows.
/// - [`StatusError::UnparseableStatus`] if `raw` is neither format.
pub fn parse_status(
    raw: &str,
    previous: Option<&NormalizedStatus>,
) -> Result<ParsedStatus, StatusError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(StatusError::EmptyStatus);
    }

    let mut ctx = ParseContext::new(previous);
    let (format, status) = match detect::classify(raw) {
        Detected::Structured(payload) => (
            StatusFormat::Structured,
            structured::parse(&payload, &mut ctx),
        ),
        Detected::Tabular => (
            StatusFormat::Tabular,
            tabular::parse(raw, &mut ctx).ok_or(StatusError::EmptyStatus)?,
        ),
        Detected::Unrecognized => return Err(StatusError::UnparseableStatus(describe(raw))),
    };

    tracing::debug!(
        %format,
        features = status.features.len(),
        "parsed status output"
    );

    Ok(ParsedStatus {
        format,
        status,
        warnings: ctx.into_warnings(),
    })
}

/// First line of the input, shortened, for error messages.
fn describe(raw: &str) -> String {
    const MAX: usize = 60;
    let first = raw.lines().next().unwrap_or_default();
    if first.chars().count() > MAX {
        let cut: String = first.chars().take(MAX).collect();
        format!("no totals or feature rows found near {:?}...", cut)
    } else {
        format!("no totals or feature rows found near {:?}", first)
    }
}
