//! Shared utility functions used across multiple modules.

use serde_json::Value;

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Current Unix timestamp in milliseconds.
pub fn unix_millis_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A JSON value counts as defined unless it is absent or `null`.
pub fn is_defined(value: Option<&Value>) -> bool {
    value.is_some_and(|value| !value.is_null())
}

/// Absent, `null`, or a whitespace-only string.
pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.trim().is_empty(),
        Some(_) => false,
    }
}

/// Parse a weight that may use `.` or `,` as the decimal separator.
///
/// Numbers pass through; blank or non-numeric text yields `None`.
pub fn parse_weight(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64().filter(|weight| weight.is_finite()),
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            text.replace(',', ".")
                .parse::<f64>()
                .ok()
                .filter(|weight| weight.is_finite())
        }
        _ => None,
    }
}
