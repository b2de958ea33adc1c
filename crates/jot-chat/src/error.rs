//! Error types for jot-chat

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result type alias using jot-chat Error
pub type Result<T> = std::result::Result<T, Error>;

/// Text shown instead of the backend's raw timeout message
pub const UPSTREAM_TIMEOUT_NOTICE: &str =
    "The response took too long. Try asking a shorter question.";

/// Errors that can occur during chat operations
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the backend client layer
    #[error(transparent)]
    Ai(#[from] jot_ai::Error),

    /// A request is already streaming
    #[error("A request is already in progress")]
    RequestInFlight,

    /// Nothing to send
    #[error("Message is empty")]
    EmptyInput,
}

/// A failure worth showing to the user in the error banner
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ErrorNotice {
    /// Network or backend failure, with its message
    Transport(String),
    /// The model did not answer in time
    UpstreamTimeout,
}

impl ErrorNotice {
    /// Classify a backend-reported error message
    pub fn classify(message: &str) -> Self {
        if jot_ai::error::is_upstream_timeout(message) {
            ErrorNotice::UpstreamTimeout
        } else {
            ErrorNotice::Transport(message.to_string())
        }
    }

    /// Classify a client error
    pub fn from_error(error: &jot_ai::Error) -> Self {
        if error.is_upstream_timeout() {
            ErrorNotice::UpstreamTimeout
        } else {
            ErrorNotice::Transport(error.to_string())
        }
    }
}

impl fmt::Display for ErrorNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorNotice::Transport(message) => write!(f, "{}", message),
            ErrorNotice::UpstreamTimeout => write!(f, "{}", UPSTREAM_TIMEOUT_NOTICE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_timeout_is_rewritten() {
        let raw = "Error: the model took too long to respond";
        let notice = ErrorNotice::classify(raw);
        assert_eq!(notice, ErrorNotice::UpstreamTimeout);
        assert_ne!(notice.to_string(), raw);
    }

    #[test]
    fn test_classify_transport_keeps_message() {
        let notice = ErrorNotice::classify("connection refused");
        assert_eq!(notice.to_string(), "connection refused");
    }

    #[test]
    fn test_from_gateway_timeout() {
        let notice = ErrorNotice::from_error(&jot_ai::Error::api(504, "Gateway Timeout"));
        assert_eq!(notice, ErrorNotice::UpstreamTimeout);
    }
}
