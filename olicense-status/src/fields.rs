//! Numeric coercion and per-field fallback shared by both parsers.

use olicense_types::{FeatureStatus, NormalizedStatus};
use serde_json::Value;

use crate::{FieldFallback, ParseWarning};

/// Parse a seat count from text. Accepts integers and integral decimals
/// (`"10"`, `"10.0"`); anything negative, fractional or non-numeric is
/// returned as the offending text.
pub(crate) fn parse_count(text: &str) -> Result<u64, String> {
    let text = text.trim();
    if let Ok(v) = text.parse::<u64>() {
        return Ok(v);
    }
    match text.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64 => {
            Ok(v as u64)
        }
        _ => Err(text.to_string()),
    }
}

/// Parse a seat count from a JSON value. Numeric strings are accepted.
pub(crate) fn count_from_json(value: &Value) -> Result<u64, String> {
    match value {
        Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                return Ok(v);
            }
            match n.as_f64() {
                Some(v) if v.is_finite() && v >= 0.0 && v.fract() == 0.0 => Ok(v as u64),
                _ => Err(n.to_string()),
            }
        }
        Value::String(s) => parse_count(s),
        other => Err(other.to_string()),
    }
}

/// Server totals as found in the source, before reconciliation.
#[derive(Debug, Default)]
pub(crate) struct Totals {
    pub total: Option<u64>,
    pub in_use: Option<u64>,
    pub available: Option<u64>,
    pub denials: Option<u64>,
    pub heartbeat: Option<f64>,
}

impl Totals {
    pub fn is_empty(&self) -> bool {
        self.total.is_none()
            && self.in_use.is_none()
            && self.available.is_none()
            && self.denials.is_none()
            && self.heartbeat.is_none()
    }
}

/// Per-parse state: the previous cycle's status (for substitution) and the
/// warnings collected so far.
#[derive(Debug)]
pub(crate) struct ParseContext<'a> {
    previous: Option<&'a NormalizedStatus>,
    warnings: Vec<ParseWarning>,
}

impl<'a> ParseContext<'a> {
    pub fn new(previous: Option<&'a NormalizedStatus>) -> Self {
        Self {
            previous,
            warnings: Vec::new(),
        }
    }

    pub fn warn(&mut self, warning: ParseWarning) {
        self.warnings.push(warning);
    }

    pub fn into_warnings(self) -> Vec<ParseWarning> {
        self.warnings
    }

    /// Resolve a server-level count, substituting the previous value (or 0)
    /// when the source value is unusable.
    pub fn server_count(
        &mut self,
        field: &str,
        parsed: Result<u64, String>,
        prior: fn(&NormalizedStatus) -> u64,
    ) -> u64 {
        match parsed {
            Ok(v) => v,
            Err(value) => {
                let previous = self.previous.map(prior);
                self.invalid(field, value, previous);
                previous.unwrap_or(0)
            }
        }
    }

    /// Resolve a per-feature count, substituting the same feature's previous
    /// value (or 0).
    pub fn feature_count(
        &mut self,
        feature: &str,
        field: &str,
        parsed: Result<u64, String>,
        prior: fn(&FeatureStatus) -> u64,
    ) -> u64 {
        match parsed {
            Ok(v) => v,
            Err(value) => {
                let previous = self
                    .previous
                    .and_then(|p| p.feature(feature))
                    .map(prior);
                self.invalid(&format!("{}.{}", feature, field), value, previous);
                previous.unwrap_or(0)
            }
        }
    }

    /// Resolve the heartbeat, substituting the previous heartbeat (or none).
    pub fn heartbeat(&mut self, parsed: Result<f64, String>) -> Option<f64> {
        match parsed {
            Ok(v) => Some(v),
            Err(value) => {
                let previous = self.previous.and_then(|p| p.heartbeat_timestamp);
                let fallback = previous.map_or(FieldFallback::Absent, FieldFallback::Previous);
                self.warn(ParseWarning::InvalidField {
                    field: "heartbeat".to_string(),
                    value,
                    fallback,
                });
                previous
            }
        }
    }

    fn invalid(&mut self, field: &str, value: String, previous: Option<u64>) {
        let fallback = previous.map_or(FieldFallback::Zero, |v| FieldFallback::Previous(v as f64));
        self.warn(ParseWarning::InvalidField {
            field: field.to_string(),
            value,
            fallback,
        });
    }

    /// Reconcile total / in-use / available into a status without features.
    ///
    /// `total` and `in_use` win over a conflicting `available`; a single
    /// missing member of the three is derived from the other two. With only
    /// one of them known, a missing `in_use` or `available` is taken as zero
    /// and a missing `total` as their sum.
    pub fn reconcile(&mut self, totals: Totals) -> NormalizedStatus {
        let (total, in_use, available) = match (totals.total, totals.in_use, totals.available) {
            (Some(total), Some(in_use), reported) => {
                let computed = total.saturating_sub(in_use);
                if let Some(reported) = reported {
                    if reported != computed {
                        self.warn(ParseWarning::InconsistentAvailable { reported, computed });
                    }
                }
                (total, in_use, computed)
            }
            (Some(total), None, Some(available)) => {
                (total, total.saturating_sub(available), available)
            }
            (None, Some(in_use), Some(available)) => {
                (in_use.saturating_add(available), in_use, available)
            }
            // Fewer than two of the three: default the unknowns so that
            // available == total - in_use still holds.
            (Some(total), None, None) => (total, 0, total),
            (None, Some(in_use), None) => (in_use, in_use, 0),
            (None, None, Some(available)) => (available, 0, available),
            (None, None, None) => (0, 0, 0),
        };
        let reported = totals.total.is_some()
            || totals.in_use.is_some()
            || totals.available.is_some()
            || totals.denials.is_some();

        if in_use > total && totals.total.is_some() {
            self.warn(ParseWarning::InUseExceedsTotal { total, in_use });
        }

        NormalizedStatus {
            server_totals_reported: reported,
            total_licenses: total,
            licenses_in_use: in_use,
            licenses_available: available,
            denials_total: totals.denials.unwrap_or(0),
            heartbeat_timestamp: totals.heartbeat,
            features: Vec::new(),
        }
    }

    /// Insert a parsed feature, warning when it replaces an earlier one.
    pub fn add_feature(&mut self, status: &mut NormalizedStatus, feature: FeatureStatus) {
        let name = feature.name.clone();
        if status.upsert_feature(feature) {
            self.warn(ParseWarning::DuplicateFeature { name });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_count_accepts_integral_values() {
        assert_eq!(parse_count("42"), Ok(42));
        assert_eq!(parse_count(" 7 "), Ok(7));
        assert_eq!(parse_count("10.0"), Ok(10));
    }

    #[test]
    fn parse_count_rejects_bad_values() {
        assert_eq!(parse_count("-1"), Err("-1".to_string()));
        assert_eq!(parse_count("2.5"), Err("2.5".to_string()));
        assert_eq!(parse_count("many"), Err("many".to_string()));
        assert_eq!(parse_count(""), Err(String::new()));
    }

    #[test]
    fn count_from_json_handles_numbers_and_strings() {
        assert_eq!(count_from_json(&json!(5)), Ok(5));
        assert_eq!(count_from_json(&json!(5.0)), Ok(5));
        assert_eq!(count_from_json(&json!("12")), Ok(12));
        assert!(count_from_json(&json!(-3)).is_err());
        assert!(count_from_json(&json!(true)).is_err());
        assert!(count_from_json(&json!([1])).is_err());
    }

    #[test]
    fn invalid_server_field_uses_previous_value() {
        let previous = NormalizedStatus::builder().total(100).in_use(40).build();
        let mut ctx = ParseContext::new(Some(&previous));

        let in_use = ctx.server_count("in_use", Err("-4".into()), |p| p.licenses_in_use);
        assert_eq!(in_use, 40);

        let warnings = ctx.into_warnings();
        assert_eq!(
            warnings,
            vec![ParseWarning::InvalidField {
                field: "in_use".into(),
                value: "-4".into(),
                fallback: FieldFallback::Previous(40.0),
            }]
        );
    }

    #[test]
    fn invalid_server_field_without_history_is_zero() {
        let mut ctx = ParseContext::new(None);
        assert_eq!(ctx.server_count("total", Err("x".into()), |p| p.total_licenses), 0);
        assert!(matches!(
            ctx.into_warnings()[0],
            ParseWarning::InvalidField {
                fallback: FieldFallback::Zero,
                ..
            }
        ));
    }

    #[test]
    fn invalid_feature_field_uses_same_feature_history() {
        let previous = NormalizedStatus::builder()
            .feature("cad", |f| f.total(10).in_use(3))
            .build();
        let mut ctx = ParseContext::new(Some(&previous));

        assert_eq!(
            ctx.feature_count("cad", "in_use", Err("n/a".into()), |f| f.licenses_in_use),
            3
        );
        assert_eq!(
            ctx.feature_count("cam", "in_use", Err("n/a".into()), |f| f.licenses_in_use),
            0
        );
    }

    #[test]
    fn invalid_heartbeat_keeps_previous() {
        let previous = NormalizedStatus::builder().heartbeat(1_700_000_000.0).build();
        let mut ctx = ParseContext::new(Some(&previous));
        assert_eq!(ctx.heartbeat(Err("soon".into())), Some(1_700_000_000.0));

        let mut ctx = ParseContext::new(None);
        assert_eq!(ctx.heartbeat(Err("soon".into())), None);
    }

    #[test]
    fn reconcile_prefers_total_and_in_use() {
        let mut ctx = ParseContext::new(None);
        let status = ctx.reconcile(Totals {
            total: Some(100),
            in_use: Some(40),
            available: Some(70),
            ..Default::default()
        });

        assert_eq!(status.licenses_available, 60);
        assert_eq!(
            ctx.into_warnings(),
            vec![ParseWarning::InconsistentAvailable {
                reported: 70,
                computed: 60
            }]
        );
    }

    #[test]
    fn reconcile_derives_missing_member() {
        let mut ctx = ParseContext::new(None);
        let status = ctx.reconcile(Totals {
            total: Some(50),
            available: Some(20),
            ..Default::default()
        });
        assert_eq!(status.licenses_in_use, 30);

        let status = ctx.reconcile(Totals {
            in_use: Some(5),
            available: Some(15),
            ..Default::default()
        });
        assert_eq!(status.total_licenses, 20);
        assert!(ctx.into_warnings().is_empty());
    }

    #[test]
    fn reconcile_flags_overcommit() {
        let mut ctx = ParseContext::new(None);
        let status = ctx.reconcile(Totals {
            total: Some(5),
            in_use: Some(8),
            ..Default::default()
        });
        assert_eq!(status.licenses_available, 0);
        assert_eq!(
            ctx.into_warnings(),
            vec![ParseWarning::InUseExceedsTotal { total: 5, in_use: 8 }]
        );
    }

    #[test]
    fn reconcile_single_known_member_keeps_available_consistent() {
        let mut ctx = ParseContext::new(None);
        let cases = [
            (Totals { total: Some(50), ..Default::default() }, (50, 0, 50)),
            (Totals { in_use: Some(7), ..Default::default() }, (7, 7, 0)),
            (Totals { available: Some(12), ..Default::default() }, (12, 0, 12)),
        ];
        for (totals, expected) in cases {
            let status = ctx.reconcile(totals);
            assert!(status.server_totals_reported);
            assert_eq!(
                (status.total_licenses, status.licenses_in_use, status.licenses_available),
                expected
            );
            assert_eq!(
                status.total_licenses - status.licenses_in_use,
                status.licenses_available
            );
        }
        assert!(ctx.into_warnings().is_empty());
    }

    #[test]
    fn reconcile_without_server_counts_is_unreported() {
        let mut ctx = ParseContext::new(None);
        let status = ctx.reconcile(Totals {
            heartbeat: Some(1_700_000_000.0),
            ..Default::default()
        });
        assert!(!status.server_totals_reported);
        assert_eq!(status.heartbeat_timestamp, Some(1_700_000_000.0));

        let status = ctx.reconcile(Totals {
            denials: Some(4),
            ..Default::default()
        });
        assert!(status.server_totals_reported);
        assert_eq!(status.denials_total, 4);
    }
}
