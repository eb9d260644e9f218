//! Error types for the core library.

use reqwest::StatusCode;
use thiserror::Error;

/// Core library error type.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A configuration-related error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A path resolution or validation error.
    #[error("path error: {0}")]
    Path(String),

    /// An I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The sign-in page did not contain an `authenticity_token` input.
    #[error("csrf token (authenticity_token) not found: {0}")]
    CsrfTokenNotFound(String),

    /// No bearer token is available, either because sign-in has not run or
    /// because the signed-in page carried none.
    #[error("auth token not found: {0}")]
    AuthTokenNotFound(String),

    /// The service rejected the supplied credentials.
    #[error("sign-in failed: {0}")]
    SignIn(String),

    /// The service answered with an unsuccessful HTTP status.
    #[error("HTTP {status} from {url}: {body}")]
    Http {
        /// Response status.
        status: StatusCode,
        /// Final request URL.
        url: String,
        /// Response body, kept for diagnostics.
        body: String,
    },

    /// The request could not be sent or the response could not be read.
    #[error("API error: {0}")]
    Api(String),

    /// Pagination fetched the configured maximum of non-empty pages.
    #[error("group {group_id}: stopped after {pages} pages without reaching the end")]
    PageLimitExceeded {
        /// Group being paginated.
        group_id: String,
        /// Number of non-empty pages fetched.
        pages: usize,
    },

    /// A generic error for other cases.
    #[error("error: {0}")]
    Other(String),
}

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
