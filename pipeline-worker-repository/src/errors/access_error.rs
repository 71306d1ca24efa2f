//! Errors from the HTTP collaborators.

use thiserror::Error;

/// Errors from the configuration store and index base service clients.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Invalid url: {0}")]
    InvalidUrl(String),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered with an unexpected status.
    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(String),
}

impl AccessError {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }
}
