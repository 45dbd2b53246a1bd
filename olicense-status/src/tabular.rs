//! Parser for free-text status reports.
//!
//! The report is read line by line. Three kinds of lines carry data:
//!
//! - totals, as `label: value` (or `label = value`) with a known label such
//!   as `Total licenses`, `In use`, `Available`, `Denials`, `Heartbeat`;
//! - feature tables, introduced by a header row whose first column is
//!   `Feature` (column order comes from the header) and ending at a blank
//!   line or the end of input;
//! - feature lines of the form `Feature cad: total=10 in_use=3 denials=0`.
//!
//! A headerless row of a name followed by four numbers is read as
//! `name total in_use borrowed denials`.

use std::sync::OnceLock;

use olicense_types::{sanitize_feature_name, FeatureStatus, NormalizedStatus};
use regex::Regex;

use crate::fields::{parse_count, ParseContext, Totals};
use crate::heartbeat::parse_heartbeat;
use crate::ParseWarning;

struct Patterns {
    key_value: Regex,
    feature_line: Regex,
    assignment: Regex,
    bare_row: Regex,
    separator: Regex,
}

/// The compiled patterns, or `None` if any failed to compile. Without them
/// no text report is recognised.
fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(Patterns {
                key_value: Regex::new(
                    r"^\s*(?P<key>[A-Za-z][A-Za-z0-9 _/.-]*?)\s*[:=]\s*(?P<value>.*?)\s*$",
                )
                .ok()?,
                feature_line: Regex::new(r"(?i)^\s*feature\s+(?P<name>\S+?)\s*:\s*(?P<rest>.*)$")
                    .ok()?,
                assignment: Regex::new(r"(?P<key>[A-Za-z_-]+)\s*=\s*(?P<value>\S+)").ok()?,
                bare_row: Regex::new(r"^\s*(?P<name>[\w.-]+)((?:\s+\d+){4})\s*$").ok()?,
                separator: Regex::new(r"^[\s\-=+|:]+$").ok()?,
            })
        })
        .as_ref()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TotalKey {
    Total,
    InUse,
    Available,
    Denials,
    Heartbeat,
}

/// Lowercase and collapse runs of whitespace, `_` and `-` to single spaces.
fn normalize_phrase(key: &str) -> String {
    key.split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn total_key(key: &str) -> Option<TotalKey> {
    match normalize_phrase(key).as_str() {
        "total licenses" | "total licence" | "total licences" | "total license"
        | "licenses total" | "total" | "capacity" => Some(TotalKey::Total),
        "in use" | "licenses in use" | "inuse" | "used" => Some(TotalKey::InUse),
        "available" | "licenses available" | "free" => Some(TotalKey::Available),
        "denials" | "license denials" | "denials total" => Some(TotalKey::Denials),
        "heartbeat" | "last heartbeat" => Some(TotalKey::Heartbeat),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Name,
    Total,
    InUse,
    Borrowed,
    Denials,
    Ignored,
}

impl Column {
    fn from_header(token: &str) -> Column {
        let key: String = token
            .chars()
            .filter(|c| !matches!(c, '_' | '-'))
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "feature" | "features" | "name" | "featurename" => Column::Name,
            "total" | "totallicenses" | "capacity" | "licenses" => Column::Total,
            "inuse" | "used" => Column::InUse,
            "borrowed" | "borrow" => Column::Borrowed,
            "denials" | "denied" => Column::Denials,
            _ => Column::Ignored,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Column::Name => "name",
            Column::Total => "total",
            Column::InUse => "in_use",
            Column::Borrowed => "borrowed",
            Column::Denials => "denials",
            Column::Ignored => "ignored",
        }
    }
}

/// Split a table line into cells on whitespace and `|`.
fn cells(line: &str) -> Vec<&str> {
    line.split(|c: char| c.is_whitespace() || c == '|')
        .filter(|cell| !cell.is_empty())
        .collect()
}

/// Two-word headers that name a single column.
const JOINED_HEADERS: [(&str, &str); 2] = [("in", "use"), ("feature", "name")];

/// Split a header line into columns, joining `In Use` and `Feature Name`
/// into one column each.
fn header_columns(line: &str) -> Option<Vec<Column>> {
    let mut tokens: Vec<String> = Vec::new();
    for token in cells(line) {
        let joins_previous = tokens.last().is_some_and(|last| {
            JOINED_HEADERS.iter().any(|(first, second)| {
                last.eq_ignore_ascii_case(first) && token.eq_ignore_ascii_case(second)
            })
        });
        match tokens.last_mut() {
            Some(last) if joins_previous => last.push_str(token),
            _ => tokens.push(token.to_string()),
        }
    }

    let columns: Vec<Column> = tokens.iter().map(|t| Column::from_header(t)).collect();
    let starts_with_name = columns.first() == Some(&Column::Name);
    let has_values = columns
        .iter()
        .skip(1)
        .any(|c| !matches!(c, Column::Name | Column::Ignored));
    (starts_with_name && has_values).then_some(columns)
}

/// True if any line looks like a totals line, a feature table or a feature
/// line.
pub(crate) fn looks_tabular(raw: &str) -> bool {
    let Some(p) = patterns() else {
        return false;
    };
    raw.lines().any(|line| {
        if header_columns(line).is_some()
            || p.feature_line.is_match(line)
            || p.bare_row.is_match(line)
        {
            return true;
        }
        p.key_value.captures(line).is_some_and(|caps| {
            total_key(&caps["key"]).is_some() || parse_count(&caps["value"]).is_ok()
        })
    })
}

/// Parse a free-text report. Returns `None` if no data-bearing line was
/// found at all.
pub(crate) fn parse(raw: &str, ctx: &mut ParseContext<'_>) -> Option<NormalizedStatus> {
    let p = patterns()?;
    let mut totals = Totals::default();
    let mut features: Vec<FeatureStatus> = Vec::new();
    let mut table: Option<Vec<Column>> = None;

    for (index, line) in raw.lines().enumerate() {
        let row = index + 1;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            table = None;
            continue;
        }
        if p.separator.is_match(trimmed) {
            continue;
        }

        if let Some(columns) = header_columns(trimmed) {
            table = Some(columns);
            continue;
        }

        if let Some(caps) = p.key_value.captures(trimmed) {
            if let Some(key) = total_key(&caps["key"]) {
                table = None;
                apply_total(key, &caps["key"], &caps["value"], &mut totals, ctx);
                continue;
            }
        }

        if let Some(caps) = p.feature_line.captures(trimmed) {
            if let Some(feature) = parse_feature_line(row, &caps["name"], &caps["rest"], ctx) {
                features.push(feature);
            }
            continue;
        }

        if let Some(columns) = &table {
            if let Some(feature) = parse_table_row(row, trimmed, columns, ctx) {
                features.push(feature);
            }
            continue;
        }

        if p.bare_row.is_match(trimmed) {
            let columns = [
                Column::Name,
                Column::Total,
                Column::InUse,
                Column::Borrowed,
                Column::Denials,
            ];
            if let Some(feature) = parse_table_row(row, trimmed, &columns, ctx) {
                features.push(feature);
            }
        }
    }

    if totals.is_empty() && features.is_empty() {
        return None;
    }

    let mut status = ctx.reconcile(totals);
    for feature in features {
        ctx.add_feature(&mut status, feature);
    }
    Some(status)
}

fn apply_total(
    key: TotalKey,
    label: &str,
    value: &str,
    totals: &mut Totals,
    ctx: &mut ParseContext<'_>,
) {
    let label = label.trim();
    match key {
        TotalKey::Total => {
            totals.total = Some(ctx.server_count(label, parse_count(value), |p| p.total_licenses))
        }
        TotalKey::InUse => {
            totals.in_use = Some(ctx.server_count(label, parse_count(value), |p| p.licenses_in_use))
        }
        TotalKey::Available => {
            totals.available =
                Some(ctx.server_count(label, parse_count(value), |p| p.licenses_available))
        }
        TotalKey::Denials => {
            totals.denials = Some(ctx.server_count(label, parse_count(value), |p| p.denials_total))
        }
        TotalKey::Heartbeat => totals.heartbeat = ctx.heartbeat(parse_heartbeat(value)),
    }
}

fn clean_name(raw: &str, ctx: &mut ParseContext<'_>) -> Option<String> {
    let name = sanitize_feature_name(raw);
    if name.is_none() {
        ctx.warn(ParseWarning::InvalidFeatureName {
            raw: raw.to_string(),
        });
    }
    name
}

fn set_column(feature: &mut FeatureStatus, column: Column, value: u64) {
    match column {
        Column::Total => feature.total_licenses = value,
        Column::InUse => feature.licenses_in_use = value,
        Column::Borrowed => feature.licenses_borrowed = value,
        Column::Denials => feature.denials_total = value,
        Column::Name | Column::Ignored => {}
    }
}

fn parse_table_row(
    row: usize,
    line: &str,
    columns: &[Column],
    ctx: &mut ParseContext<'_>,
) -> Option<FeatureStatus> {
    let tokens = cells(line);
    let name = clean_name(tokens.first().copied().unwrap_or_default(), ctx)?;

    let mut feature = FeatureStatus::new(name);
    let mut numeric = 0usize;
    for (column, token) in columns.iter().zip(tokens.iter()).skip(1) {
        if matches!(column, Column::Name | Column::Ignored) {
            continue;
        }
        match parse_count(token) {
            Ok(value) => {
                set_column(&mut feature, *column, value);
                numeric += 1;
            }
            Err(raw) => {
                ctx.warn(ParseWarning::FeatureRowSkipped {
                    row,
                    reason: format!("non-numeric {} value {:?}", column.label(), raw),
                });
                return None;
            }
        }
    }

    if numeric == 0 {
        ctx.warn(ParseWarning::FeatureRowSkipped {
            row,
            reason: "expected a name and at least one numeric column".to_string(),
        });
        return None;
    }
    Some(feature)
}

fn parse_feature_line(
    row: usize,
    raw_name: &str,
    rest: &str,
    ctx: &mut ParseContext<'_>,
) -> Option<FeatureStatus> {
    let assignment = &patterns()?.assignment;
    let name = clean_name(raw_name, ctx)?;
    let mut feature = FeatureStatus::new(name);
    let mut numeric = 0usize;

    for caps in assignment.captures_iter(rest) {
        let column = Column::from_header(&caps["key"]);
        if matches!(column, Column::Name | Column::Ignored) {
            continue;
        }
        match parse_count(&caps["value"]) {
            Ok(value) => {
                set_column(&mut feature, column, value);
                numeric += 1;
            }
            Err(raw) => {
                ctx.warn(ParseWarning::FeatureRowSkipped {
                    row,
                    reason: format!("non-numeric {} value {:?}", column.label(), raw),
                });
                return None;
            }
        }
    }

    if numeric == 0 {
        ctx.warn(ParseWarning::FeatureRowSkipped {
            row,
            reason: "feature line has no numeric values".to_string(),
        });
        return None;
    }
    Some(feature)
}
