//! HTTP error types

use crate::types::HttpMethodError;

/// Error type for HTTP operations
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("API error (status {status}): {}", errors.join("; "))]
    Api { status: u16, errors: Vec<String> },

    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(#[from] HttpMethodError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl HttpError {
    /// HTTP status returned by the server, if the request got that far
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Api { status, .. } => Some(*status),
            HttpError::NetworkError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// The addressed resource does not exist (already removed or never created)
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Whether the server's error messages contain `needle`
    pub fn mentions(&self, needle: &str) -> bool {
        match self {
            HttpError::Api { errors, .. } => errors.iter().any(|e| e.contains(needle)),
            other => other.to_string().contains(needle),
        }
    }
}
