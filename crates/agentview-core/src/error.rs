//! Error types for the agentview sync core
//!
//! One taxonomy shared by every layer:
//! - Transport failures (server unreachable, timeouts)
//! - Non-2xx HTTP responses with optional structured detail
//! - Malformed payloads (push messages, response bodies, config documents)
//! - Server-reported failure of an analysis session

/// Main client error type
///
/// `Clone` so that it can live inside observable state snapshots and be
/// handed to user callbacks without giving up ownership.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Transport unreachable, connection reset or timed out
    #[error("network error: {0}")]
    Network(String),

    /// Server answered with a non-2xx status
    #[error("http error {status}: {}", .detail.as_deref().unwrap_or("no detail"))]
    Http {
        /// HTTP status code
        status: u16,
        /// Structured detail extracted from the response body
        detail: Option<String>,
    },

    /// Malformed payload
    #[error("parse error: {0}")]
    Parse(String),

    /// The analysis itself failed on the server
    #[error("session failed: {0}")]
    Session(String),

    /// Invalid client configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation cancelled before completion
    #[error("operation cancelled")]
    Cancelled,
}

impl ClientError {
    /// Create an HTTP error
    #[inline]
    #[must_use]
    pub fn http(status: u16, detail: Option<String>) -> Self {
        Self::Http { status, detail }
    }

    /// HTTP status carried by the error, if any
    #[inline]
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if retrying the same request may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Check if the error ends the analysis session
    #[inline]
    #[must_use]
    pub fn is_terminal_for_session(&self) -> bool {
        matches!(self, Self::Session(_))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Result alias used across the workspace
pub type ClientResult<T> = Result<T, ClientError>;
