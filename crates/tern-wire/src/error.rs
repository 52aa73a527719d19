//! Error types for tern-wire

use thiserror::Error;

/// Result type alias using tern-wire Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the chat backend
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading a local file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend returned a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Stream was aborted
    #[error("Request aborted")]
    Aborted,

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create an API error from a status code and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Check if this error is worth retrying automatically
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            Error::Api { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }

    /// Check if this error came from cooperative cancellation
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_status_codes() {
        assert!(Error::api(429, "slow down").is_retryable());
        assert!(Error::api(500, "internal").is_retryable());
        assert!(Error::api(503, "unavailable").is_retryable());
    }

    #[test]
    fn test_not_retryable_client_errors() {
        assert!(!Error::api(400, "bad request").is_retryable());
        assert!(!Error::api(401, "unauthorized").is_retryable());
        assert!(!Error::api(404, "no such chat").is_retryable());
    }

    #[test]
    fn test_not_retryable_non_http() {
        assert!(!Error::Aborted.is_retryable());
        assert!(!Error::UnexpectedResponse("garbage".into()).is_retryable());
        assert!(!Error::InvalidConfig("no base url".into()).is_retryable());
    }

    #[test]
    fn test_aborted_detection() {
        assert!(Error::Aborted.is_aborted());
        assert!(!Error::api(500, "x").is_aborted());
    }

    #[test]
    fn test_api_display() {
        let e = Error::api(502, "bad gateway");
        assert_eq!(e.to_string(), "API error (502): bad gateway");
    }
}
