//! InstaGo API client error types.

use std::sync::Arc;

/// Errors from the InstaGo REST API client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No bearer token configured.
    #[error("missing API token: not authenticated")]
    MissingToken,

    /// Authentication failed (expired or invalid token).
    #[error("authentication failed: invalid or expired token")]
    AuthError,

    /// Rate limited by the server.
    #[error("rate limited: too many requests")]
    RateLimited,

    /// HTTP error response.
    #[error("HTTP error: {status}")]
    HttpError { status: u16 },

    /// Request timeout.
    #[error("request timeout")]
    Timeout,

    /// Network error.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// Response parse error.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid request parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { ApiError::Timeout } else { ApiError::Network(Arc::new(err)) }
    }
}
