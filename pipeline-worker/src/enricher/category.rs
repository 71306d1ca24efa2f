//! Category-specific enrichment.

use md5::{Digest, Md5};
use serde_json::{json, Map, Value};
use tracing::warn;

use pipeline_worker_shared::Category;

use super::FIELD_TIMESTAMP;

/// Width of a metric routing bucket in seconds.
const METRIC_BUCKET_SECS: i64 = 7200;

/// Run the enrichment of `category`, returning the routing key if any.
pub(crate) fn enrich(category: Category, doc: &mut Map<String, Value>) -> Option<String> {
    match category {
        Category::Metric => enrich_metric(doc),
        Category::Trace => enrich_trace(doc),
        Category::Other => None,
    }
}

/// Stamp `__tsid` and, with an integer `@timestamp`, `__routing`.
fn enrich_metric(doc: &mut Map<String, Value>) -> Option<String> {
    let fingerprint = label_fingerprint(doc);
    let tsid = hex::encode(Md5::digest(fingerprint.as_bytes()));
    doc.insert("__tsid".to_string(), json!(tsid));

    let Some(timestamp) = doc.get(FIELD_TIMESTAMP).and_then(Value::as_i64) else {
        warn!(tsid = %tsid, "Metric without integer @timestamp, no routing");
        return None;
    };
    let bucket = timestamp.div_euclid(1000).div_euclid(METRIC_BUCKET_SECS);
    let routing = format!("{}-{}", tsid, bucket);
    doc.insert("__routing".to_string(), json!(routing));
    Some(routing)
}

/// Sorted `k=v` pairs of the metric labels joined by commas.
///
/// Labels found only under `prometheus.labels` are moved to `labels` first.
fn label_fingerprint(doc: &mut Map<String, Value>) -> String {
    if !doc.contains_key("labels") {
        let hoisted = match doc.get_mut("prometheus") {
            Some(Value::Object(prometheus)) => prometheus.remove("labels"),
            Some(other) => {
                warn!(prometheus = %other, "Property 'prometheus' is not an object");
                None
            }
            None => None,
        };
        match hoisted {
            Some(labels) => {
                doc.insert("labels".to_string(), labels);
            }
            None => {
                warn!("Metric has neither 'labels' nor 'prometheus.labels'");
                return String::new();
            }
        }
    }

    let Some(Value::Object(labels)) = doc.get("labels") else {
        warn!(labels = %doc["labels"], "Property 'labels' is not an object");
        return String::new();
    };

    let mut pairs: Vec<(&String, &Value)> = labels.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    pairs
        .into_iter()
        .map(|(key, value)| format!("{}={}", key, label_value(value)))
        .collect::<Vec<_>>()
        .join(",")
}

fn label_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Derive `@timestamp` and `Duration` from span times and route by trace ID.
fn enrich_trace(doc: &mut Map<String, Value>) -> Option<String> {
    let start = doc.get("StartTime").and_then(Value::as_i64);
    if let Some(start) = start {
        // StartTime is in nanoseconds
        doc.insert(FIELD_TIMESTAMP.to_string(), json!(start / 1000 / 1000));
    }

    if !doc.contains_key("Duration") {
        let end = doc.get("EndTime").and_then(Value::as_i64);
        if let (Some(start), Some(end)) = (start, end) {
            match end.checked_sub(start) {
                Some(duration) => {
                    doc.insert("Duration".to_string(), json!(duration));
                }
                None => warn!(start, end, "Span duration overflows, Duration not set"),
            }
        }
    }

    doc.get("SpanContext")
        .and_then(|context| context.get("TraceID"))
        .map(label_value)
        .filter(|trace_id| !trace_id.is_empty())
}
