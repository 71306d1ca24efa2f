//! Index base metadata and record categories.

use serde::{Deserialize, Serialize};

/// Resolved metadata of a logical index family.
///
/// Looked up once when a worker starts and immutable for its lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexBaseInfo {
    pub base_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub data_type: String,
    #[serde(default)]
    pub category: String,
}

/// Record category driving category-specific enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Metric,
    Trace,
    Other,
}

impl Category {
    pub fn parse(value: &str) -> Self {
        match value {
            "metric" => Self::Metric,
            "trace" => Self::Trace,
            _ => Self::Other,
        }
    }
}
