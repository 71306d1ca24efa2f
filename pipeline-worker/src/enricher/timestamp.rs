//! `@timestamp` normalization.

use chrono::DateTime;
use serde_json::{json, Map, Value};

use super::FIELD_TIMESTAMP;

/// Rewrite `@timestamp` as epoch milliseconds.
///
/// Integers are kept. RFC 3339 strings and integer strings are converted.
/// Anything else, including a missing field, becomes `write_time`.
pub(crate) fn normalize(doc: &mut Map<String, Value>, write_time: i64) {
    let normalized = match doc.get(FIELD_TIMESTAMP) {
        Some(Value::String(s)) if !s.is_empty() => parse_str(s).unwrap_or(write_time),
        Some(Value::Number(n)) => n.as_i64().unwrap_or(write_time),
        _ => write_time,
    };
    doc.insert(FIELD_TIMESTAMP.to_string(), json!(normalized));
}

fn parse_str(s: &str) -> Option<i64> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.timestamp_millis());
    }
    s.trim().parse::<i64>().ok()
}
