//! Error types for jot-ai

use thiserror::Error;

/// Result type alias using jot-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Phrases the backend uses when the model did not answer in time.
const UPSTREAM_TIMEOUT_PHRASES: &[&str] = &["too long to respond", "took too long"];

/// Errors that can occur when talking to the journal backend
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Local file access failed (uploads)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend returned a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The response stream broke mid-transfer
    #[error("Stream error: {0}")]
    Stream(String),

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

    /// Check if this error means the upstream model took too long
    pub fn is_upstream_timeout(&self) -> bool {
        match self {
            Error::Api { status, message } => *status == 504 || is_upstream_timeout(message),
            Error::Stream(message) => is_upstream_timeout(message),
            Error::Http(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Check if this error is an authentication failure
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Api { status: 401 | 403, .. })
    }
}

/// Check whether a backend message reports an upstream timeout
pub fn is_upstream_timeout(message: &str) -> bool {
    let lower = message.to_lowercase();
    UPSTREAM_TIMEOUT_PHRASES.iter().any(|p| lower.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_timeout_phrase() {
        assert!(is_upstream_timeout("Model took too long to respond"));
        assert!(is_upstream_timeout(
            "Error: The response took too long. Try asking a shorter question."
        ));
        assert!(!is_upstream_timeout("connection refused"));
    }

    #[test]
    fn test_upstream_timeout_api_variants() {
        assert!(Error::api(504, "Gateway Timeout").is_upstream_timeout());
        assert!(Error::api(500, "The model took too long to respond").is_upstream_timeout());
        assert!(!Error::api(500, "Internal Server Error").is_upstream_timeout());
        assert!(Error::Stream("too long to respond".into()).is_upstream_timeout());
    }

    #[test]
    fn test_not_upstream_timeout_other_variants() {
        assert!(!Error::UnexpectedResponse("no body".into()).is_upstream_timeout());
        assert!(!Error::InvalidConfig("bad url".into()).is_upstream_timeout());
    }

    #[test]
    fn test_unauthorized() {
        assert!(Error::api(401, "Not authenticated").is_unauthorized());
        assert!(Error::api(403, "Forbidden").is_unauthorized());
        assert!(!Error::api(404, "Not found").is_unauthorized());
    }
}
