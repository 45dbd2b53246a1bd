//! Format detection.

use std::fmt;

use serde_json::{Map, Value};

use crate::{structured, tabular};

/// The shape of a raw status observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusFormat {
    /// A JSON object carrying server totals.
    Structured,
    /// A free-text report with `label: value` lines or feature tables.
    Tabular,
    /// Neither.
    Unrecognized,
}

impl fmt::Display for StatusFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StatusFormat::Structured => "structured",
            StatusFormat::Tabular => "tabular",
            StatusFormat::Unrecognized => "unrecognized",
        })
    }
}

/// Detection result. The structured variant keeps the decoded object so it
/// is only decoded once.
#[derive(Debug)]
pub(crate) enum Detected {
    Structured(Map<String, Value>),
    Tabular,
    Unrecognized,
}

impl Detected {
    pub fn format(&self) -> StatusFormat {
        match self {
            Detected::Structured(_) => StatusFormat::Structured,
            Detected::Tabular => StatusFormat::Tabular,
            Detected::Unrecognized => StatusFormat::Unrecognized,
        }
    }
}

pub(crate) fn classify(raw: &str) -> Detected {
    if let Ok(Value::Object(payload)) = serde_json::from_str::<Value>(raw) {
        if structured::has_totals(&payload) {
            return Detected::Structured(payload);
        }
    }
    if tabular::looks_tabular(raw) {
        Detected::Tabular
    } else {
        Detected::Unrecognized
    }
}

/// Decide which parser applies to `raw`.
///
/// ```rust
/// use olicense_status::{detect, StatusFormat};
///
/// assert_eq!(detect(r#"{"total": 5}"#), StatusFormat::Structured);
/// assert_eq!(detect("Total licenses: 5"), StatusFormat::Tabular);
/// assert_eq!(detect("<html></html>"), StatusFormat::Unrecognized);
/// ```
pub fn detect(raw: &str) -> StatusFormat {
    classify(raw).format()
}
