//! Connection settings for the search index backend.

use std::env;

const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";

/// Search index connection settings.
#[derive(Debug, Clone)]
pub struct SearchIndexConfig {
    pub url: String,
    /// Basic auth username, used only together with `password`.
    pub username: Option<String>,
    pub password: Option<String>,
}

impl SearchIndexConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
        }
    }

    /// Read `OPENSEARCH_URL`, `OPENSEARCH_USERNAME` and `OPENSEARCH_PASSWORD`.
    pub fn from_env() -> Self {
        Self {
            url: env::var("OPENSEARCH_URL").unwrap_or_else(|_| DEFAULT_OPENSEARCH_URL.to_string()),
            username: env::var("OPENSEARCH_USERNAME").ok(),
            password: env::var("OPENSEARCH_PASSWORD").ok(),
        }
    }

    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some((username.as_str(), password.as_str())),
            _ => None,
        }
    }
}
