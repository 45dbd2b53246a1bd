//! Parser for structured (JSON) status output.
//!
//! Expected shape, with every field optional and unknown fields ignored:
//!
//! ```json
//! {
//!   "total": 100, "inUse": 40, "available": 60, "denials": 2,
//!   "heartbeat": "2024-01-02T03:04:05Z",
//!   "features": [{ "name": "cad", "total": 10, "inUse": 3, "borrowed": 0, "denials": 0 }]
//! }
//! ```
//!
//! Totals may also be nested under a `"totals"` object, and `features` may be
//! an object keyed by feature name.

use olicense_types::{sanitize_feature_name, FeatureStatus, NormalizedStatus};
use serde_json::{Map, Value};

use crate::fields::{count_from_json, ParseContext, Totals};
use crate::heartbeat::heartbeat_from_json;
use crate::ParseWarning;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerField {
    Total,
    InUse,
    Available,
    Denials,
    Heartbeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeatureField {
    Total,
    InUse,
    Borrowed,
    Denials,
}

/// Lowercase and drop `_`, `-` and spaces, so `inUse`, `in_use` and
/// `IN-USE` all compare equal.
fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

fn server_field(key: &str) -> Option<ServerField> {
    match normalize_key(key).as_str() {
        "total" | "totallicenses" | "capacity" => Some(ServerField::Total),
        "inuse" | "used" | "licensesinuse" => Some(ServerField::InUse),
        "available" | "free" | "licensesavailable" => Some(ServerField::Available),
        "denials" | "denialstotal" => Some(ServerField::Denials),
        "heartbeat" | "heartbeattimestamp" | "lastheartbeat" => Some(ServerField::Heartbeat),
        _ => None,
    }
}

fn feature_field(key: &str) -> Option<FeatureField> {
    match normalize_key(key).as_str() {
        "total" | "totallicenses" | "capacity" => Some(FeatureField::Total),
        "inuse" | "used" | "licensesinuse" => Some(FeatureField::InUse),
        "borrowed" | "licensesborrowed" => Some(FeatureField::Borrowed),
        "denials" | "denialstotal" => Some(FeatureField::Denials),
        _ => None,
    }
}

fn nested_totals(payload: &Map<String, Value>) -> Option<&Map<String, Value>> {
    payload
        .iter()
        .find(|(k, _)| normalize_key(k) == "totals")
        .and_then(|(_, v)| v.as_object())
}

/// True if the object carries at least one server total, either at the top
/// level or in a nested `totals` object.
pub(crate) fn has_totals(payload: &Map<String, Value>) -> bool {
    nested_totals(payload).is_some() || payload.keys().any(|k| server_field(k).is_some())
}

/// Parse a decoded status object.
pub(crate) fn parse(payload: &Map<String, Value>, ctx: &mut ParseContext<'_>) -> NormalizedStatus {
    let mut totals = Totals::default();
    collect_totals(payload, &mut totals, ctx);
    if let Some(nested) = nested_totals(payload) {
        collect_totals(nested, &mut totals, ctx);
    }

    let mut status = ctx.reconcile(totals);

    let features = payload
        .iter()
        .find(|(k, _)| normalize_key(k) == "features")
        .map(|(_, v)| v);

    match features {
        Some(Value::Array(entries)) => {
            for (index, entry) in entries.iter().enumerate() {
                match entry.as_object() {
                    Some(obj) => {
                        let name = feature_name(obj);
                        if let Some(feature) = parse_feature(index, name, obj, ctx) {
                            ctx.add_feature(&mut status, feature);
                        }
                    }
                    None => ctx.warn(ParseWarning::FeatureRowSkipped {
                        row: index,
                        reason: format!("expected an object, found {}", entry),
                    }),
                }
            }
        }
        Some(Value::Object(by_name)) => {
            for (index, (name, entry)) in by_name.iter().enumerate() {
                match entry.as_object() {
                    Some(obj) => {
                        if let Some(feature) = parse_feature(index, Some(name.clone()), obj, ctx) {
                            ctx.add_feature(&mut status, feature);
                        }
                    }
                    None => ctx.warn(ParseWarning::FeatureRowSkipped {
                        row: index,
                        reason: format!("expected an object for {:?}", name),
                    }),
                }
            }
        }
        Some(Value::Null) | None => {}
        Some(other) => ctx.warn(ParseWarning::FeatureRowSkipped {
            row: 0,
            reason: format!("features must be a list, found {}", other),
        }),
    }

    status
}

fn collect_totals(obj: &Map<String, Value>, totals: &mut Totals, ctx: &mut ParseContext<'_>) {
    for (key, value) in obj {
        let Some(field) = server_field(key) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        match field {
            ServerField::Total => {
                totals.total = Some(ctx.server_count(key, count_from_json(value), |p| {
                    p.total_licenses
                }))
            }
            ServerField::InUse => {
                totals.in_use = Some(ctx.server_count(key, count_from_json(value), |p| {
                    p.licenses_in_use
                }))
            }
            ServerField::Available => {
                totals.available = Some(ctx.server_count(key, count_from_json(value), |p| {
                    p.licenses_available
                }))
            }
            ServerField::Denials => {
                totals.denials = Some(ctx.server_count(key, count_from_json(value), |p| {
                    p.denials_total
                }))
            }
            ServerField::Heartbeat => totals.heartbeat = ctx.heartbeat(heartbeat_from_json(value)),
        }
    }
}

fn feature_name(obj: &Map<String, Value>) -> Option<String> {
    ["name", "feature"]
        .iter()
        .filter_map(|key| obj.get(*key))
        .find_map(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn parse_feature(
    index: usize,
    name: Option<String>,
    obj: &Map<String, Value>,
    ctx: &mut ParseContext<'_>,
) -> Option<FeatureStatus> {
    let Some(raw_name) = name else {
        ctx.warn(ParseWarning::FeatureMissingName { index });
        return None;
    };
    let Some(name) = sanitize_feature_name(&raw_name) else {
        ctx.warn(ParseWarning::InvalidFeatureName { raw: raw_name });
        return None;
    };

    let mut feature = FeatureStatus::new(name.clone());
    for (key, value) in obj {
        let Some(field) = feature_field(key) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        let parsed = count_from_json(value);
        match field {
            FeatureField::Total => {
                feature.total_licenses =
                    ctx.feature_count(&name, key, parsed, |f| f.total_licenses)
            }
            FeatureField::InUse => {
                feature.licenses_in_use =
                    ctx.feature_count(&name, key, parsed, |f| f.licenses_in_use)
            }
            FeatureField::Borrowed => {
                feature.licenses_borrowed =
                    ctx.feature_count(&name, key, parsed, |f| f.licenses_borrowed)
            }
            FeatureField::Denials => {
                feature.denials_total = ctx.feature_count(&name, key, parsed, |f| f.denials_total)
            }
        }
    }
    Some(feature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FieldFallback;
    use serde_json::json;

    fn parse_value(value: Value, previous: Option<&NormalizedStatus>) -> (NormalizedStatus, Vec<ParseWarning>) {
        let map = value.as_object().cloned().unwrap();
        let mut ctx = ParseContext::new(previous);
        let status = parse(&map, &mut ctx);
        (status, ctx.into_warnings())
    }

    #[test]
    fn parses_example_document() {
        let (status, warnings) = parse_value(
            json!({"total":100,"inUse":40,"denials":2,"features":[{"name":"cad","total":10,"inUse":3,"denials":0}]}),
            None,
        );

        assert!(warnings.is_empty());
        assert_eq!(status.total_licenses, 100);
        assert_eq!(status.licenses_in_use, 40);
        assert_eq!(status.licenses_available, 60);
        assert_eq!(status.denials_total, 2);
        assert_eq!(status.heartbeat_timestamp, None);
        assert_eq!(
            status.features,
            vec![FeatureStatus::builder("cad").total(10).in_use(3).build()]
        );
    }

    #[test]
    fn accepts_aliases_and_ignores_unknown_fields() {
        let (status, warnings) = parse_value(
            json!({
                "TOTAL_LICENSES": "50",
                "used": 20,
                "free": 30,
                "server_version": "4.2",
                "heartbeat": 1_700_000_000,
                "features": [{"feature": "cam", "capacity": 5, "in_use": 1, "borrowed": 2}]
            }),
            None,
        );

        assert!(warnings.is_empty());
        assert_eq!(status.total_licenses, 50);
        assert_eq!(status.licenses_in_use, 20);
        assert_eq!(status.licenses_available, 30);
        assert_eq!(status.heartbeat_timestamp, Some(1_700_000_000.0));
        let cam = status.feature("cam").unwrap();
        assert_eq!(cam.total_licenses, 5);
        assert_eq!(cam.licenses_borrowed, 2);
    }

    #[test]
    fn reads_nested_totals_and_feature_map() {
        let (status, _) = parse_value(
            json!({
                "totals": {"total": 8, "in_use": 2},
                "features": {"cad": {"total": 8, "in_use": 2}}
            }),
            None,
        );
        assert_eq!(status.licenses_available, 6);
        assert_eq!(status.feature("cad").unwrap().licenses_in_use, 2);
    }

    #[test]
    fn nameless_feature_is_dropped_with_warning() {
        let (status, warnings) = parse_value(
            json!({"total": 10, "features": [{"total": 3}, {"name": "cad", "total": 4}]}),
            None,
        );
        assert_eq!(status.features.len(), 1);
        assert_eq!(warnings, vec![ParseWarning::FeatureMissingName { index: 0 }]);
    }

    #[test]
    fn control_characters_are_removed_from_names() {
        let (status, warnings) = parse_value(
            json!({"total": 1, "features": [{"name": "ca\nd", "total": 1}, {"name": "\u{0007}"}]}),
            None,
        );
        assert_eq!(status.features[0].name, "cad");
        assert_eq!(
            warnings,
            vec![ParseWarning::InvalidFeatureName {
                raw: "\u{0007}".into()
            }]
        );
    }

    #[test]
    fn invalid_field_substitutes_previous_cycle() {
        let previous = NormalizedStatus::builder()
            .total(100)
            .in_use(40)
            .feature("cad", |f| f.total(10).in_use(3))
            .build();
        let (status, warnings) = parse_value(
            json!({"total": 100, "inUse": -1, "features": [{"name": "cad", "total": 10, "inUse": "lots"}]}),
            Some(&previous),
        );

        assert_eq!(status.licenses_in_use, 40);
        assert_eq!(status.licenses_available, 60);
        assert_eq!(status.feature("cad").unwrap().licenses_in_use, 3);
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().all(|w| matches!(
            w,
            ParseWarning::InvalidField {
                fallback: FieldFallback::Previous(_),
                ..
            }
        )));
    }

    #[test]
    fn invalid_field_without_history_is_zero() {
        let (status, warnings) = parse_value(json!({"total": 10, "denials": "n/a"}), None);
        assert_eq!(status.denials_total, 0);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn inconsistent_available_warns_and_trusts_totals() {
        let (status, warnings) =
            parse_value(json!({"total": 100, "inUse": 40, "available": 10}), None);
        assert_eq!(status.licenses_available, 60);
        assert_eq!(
            warnings,
            vec![ParseWarning::InconsistentAvailable {
                reported: 10,
                computed: 60
            }]
        );
    }

    #[test]
    fn duplicate_feature_last_wins() {
        let (status, warnings) = parse_value(
            json!({"total": 1, "features": [{"name": "cad", "total": 1}, {"name": "cad", "total": 9}]}),
            None,
        );
        assert_eq!(status.features.len(), 1);
        assert_eq!(status.features[0].total_licenses, 9);
        assert_eq!(
            warnings,
            vec![ParseWarning::DuplicateFeature { name: "cad".into() }]
        );
    }

    #[test]
    fn detects_totals() {
        assert!(has_totals(json!({"inUse": 1}).as_object().unwrap()));
        assert!(has_totals(json!({"totals": {}}).as_object().unwrap()));
        assert!(!has_totals(json!({"features": []}).as_object().unwrap()));
    }
}
