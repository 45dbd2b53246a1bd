//! Feature-name sanitization.
//!
//! Feature names end up as Prometheus label values, so they must not carry
//! control characters (newlines in particular would split a series line).

/// Strip control characters and surrounding whitespace from a feature name.
///
/// Returns `None` if nothing printable is left.
///
/// ```rust
/// use olicense_types::sanitize_feature_name;
///
/// assert_eq!(sanitize_feature_name("  cad\u{7}\n"), Some("cad".to_string()));
/// assert_eq!(sanitize_feature_name("\t\r\n"), None);
/// ```
pub fn sanitize_feature_name(raw: &str) -> Option<String> {
    let cleaned: String = raw.chars().filter(|c| !c.is_control()).collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
