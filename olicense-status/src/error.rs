//! Error and warning types for status ingestion.

use std::fmt;

use thiserror::Error;

/// Errors that fail a whole scrape cycle.
///
/// All of these are recovered by the poller: the cycle is reported as failed
/// and the last good data stays published.
#[derive(Debug, Error)]
pub enum StatusError {
    /// The raw status could not be obtained (command failed, timed out,
    /// exited non-zero, file missing).
    #[error("status source unavailable: {0}")]
    SourceUnavailable(String),

    /// The status text matched neither the structured nor the tabular format.
    #[error("unparseable status output: {0}")]
    UnparseableStatus(String),

    /// The status text was blank, or contained nothing usable.
    #[error("status output was empty")]
    EmptyStatus,

    /// Anything else that went wrong while processing a cycle.
    #[error("unexpected fault: {0}")]
    Internal(String),
}

impl StatusError {
    /// Short machine-friendly name, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            StatusError::SourceUnavailable(_) => "source_unavailable",
            StatusError::UnparseableStatus(_) => "unparseable_status",
            StatusError::EmptyStatus => "empty_status",
            StatusError::Internal(_) => "internal",
        }
    }
}

impl From<std::io::Error> for StatusError {
    fn from(err: std::io::Error) -> Self {
        StatusError::SourceUnavailable(err.to_string())
    }
}

/// What replaced a field whose value could not be used.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldFallback {
    /// The value from the previous successful cycle.
    Previous(f64),
    /// Zero, because no earlier value exists.
    Zero,
    /// Left unset (optional fields only).
    Absent,
}

impl fmt::Display for FieldFallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldFallback::Previous(v) => write!(f, "using previous value {}", v),
            FieldFallback::Zero => write!(f, "using 0"),
            FieldFallback::Absent => write!(f, "leaving it unset"),
        }
    }
}

/// Non-fatal problems found while parsing.
///
/// Warnings are logged but do not affect whether the scrape succeeded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseWarning {
    /// A numeric field was negative or not a number.
    #[error("invalid value {value:?} for {field}, {fallback}")]
    InvalidField {
        field: String,
        value: String,
        fallback: FieldFallback,
    },

    /// `available` disagrees with `total - in_use`.
    #[error("available={reported} conflicts with total - in_use = {computed}, using {computed}")]
    InconsistentAvailable { reported: u64, computed: u64 },

    #[error("in_use={in_use} exceeds total={total}")]
    InUseExceedsTotal { total: u64, in_use: u64 },

    /// A structured feature entry without a name.
    #[error("feature entry #{index} has no name, dropped")]
    FeatureMissingName { index: usize },

    /// A feature name that is empty once control characters are removed.
    #[error("feature name {raw:?} is empty after sanitizing, dropped")]
    InvalidFeatureName { raw: String },

    /// A feature row or entry that could not be used.
    #[error("feature row {row} skipped: {reason}")]
    FeatureRowSkipped { row: usize, reason: String },

    /// The same feature appeared more than once; the last occurrence wins.
    #[error("feature {name:?} listed more than once, keeping the last occurrence")]
    DuplicateFeature { name: String },
}
