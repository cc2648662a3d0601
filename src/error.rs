//! Error taxonomy for the sync pipeline
//!
//! Every fallible step between the upstream API and the commit store reports one
//! of these categories. Application edges (config loading, CLI, server bootstrap)
//! wrap them in `anyhow` instead.

use std::time::Duration;

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by listing, fetching, syncing and storing commits.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Credentials were rejected (invalid, expired or missing scopes).
    #[error("authentication failed: {message}")]
    Auth { message: String },

    /// The upstream API signalled throttling.
    #[error("rate limited by upstream: {message}")]
    RateLimit {
        retry_after: Option<Duration>,
        message: String,
    },

    /// Any other non-success response or a connectivity failure.
    #[error("upstream request failed: {message}")]
    Upstream {
        status: Option<u16>,
        message: String,
    },

    /// The response body could not be decoded into the expected shape.
    #[error("failed to parse {context}: {message}")]
    Parse { context: String, message: String },

    /// Schema creation, transaction or query failure.
    #[error("store error: {0}")]
    Store(String),

    /// A request exceeded its deadline.
    #[error("request timed out: {0}")]
    Timeout(String),
}

impl Error {
    pub fn upstream(message: impl Into<String>) -> Self {
        Error::Upstream {
            status: None,
            message: message.into(),
        }
    }

    pub fn parse(context: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Parse {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Stable category name, used in logs and error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Auth { .. } => "auth",
            Error::RateLimit { .. } => "rate_limit",
            Error::Upstream { .. } => "upstream",
            Error::Parse { .. } => "parse",
            Error::Store(_) => "store",
            Error::Timeout(_) => "timeout",
        }
    }

    /// Whether the request that produced this error may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RateLimit { .. } | Error::Timeout(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Store(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let target = err
            .url()
            .map(|url| url.path().to_string())
            .unwrap_or_else(|| "request".to_string());

        if err.is_timeout() {
            Error::Timeout(target)
        } else if err.is_decode() {
            Error::parse(target, err.to_string())
        } else {
            Error::Upstream {
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            }
        }
    }
}
