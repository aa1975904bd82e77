//! Error types for the search library.

use thiserror::Error;

/// Result type alias for search operations.
pub type Result<T> = std::result::Result<T, SearchError>;

/// Errors that can occur during search operations.
#[derive(Error, Debug)]
pub enum SearchError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The engine answered with a non-success status code.
    #[error("Engine responded with HTTP status {0}")]
    HttpStatus(u16),

    /// The engine returned nothing and reported a problem doing so
    /// (captcha page, consent wall, soft block).
    #[error("Empty response: {0}")]
    EmptyResponse(String),

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Per-request timeout exceeded.
    #[error("Search timeout exceeded")]
    Timeout,

    /// The overall deadline expired before the task could run.
    #[error("Search deadline exceeded")]
    DeadlineExceeded,

    /// No engines configured.
    #[error("No search engines configured")]
    NoEngines,

    /// Engine name is not registered.
    #[error("Unknown search engine: {0}")]
    UnknownEngine(String),

    /// Invalid query.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// URL parsing error.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl SearchError {
    /// Returns the HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            SearchError::HttpStatus(code) => Some(*code),
            SearchError::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the failure happened on the wire rather than in our own code.
    ///
    /// Transport failures count against the proxy that carried the request.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SearchError::Http(_)
                | SearchError::HttpStatus(_)
                | SearchError::EmptyResponse(_)
                | SearchError::Timeout
        )
    }

    /// Whether the failure looks like the engine is blocking us.
    pub fn is_rate_limit_signal(&self) -> bool {
        if matches!(self, SearchError::EmptyResponse(_)) {
            return true;
        }
        matches!(self.status(), Some(429) | Some(403))
    }

    /// Whether the error should be raised before any work is dispatched.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SearchError::NoEngines
                | SearchError::UnknownEngine(_)
                | SearchError::InvalidQuery(_)
                | SearchError::Config(_)
        )
    }
}
