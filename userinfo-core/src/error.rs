//! Error type shared by the fetch and compositing pipelines.

use thiserror::Error;

/// Errors raised inside the fetch and compositing pipelines.
///
/// None of these reach callers of the cache operations; they are logged and
/// counted, and the affected record fields simply stay unpopulated.
#[derive(Debug, Error)]
pub enum UserInfoError {
    /// Connection or transport failure.
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Status received.
        status: reqwest::StatusCode,
        /// Requested URL.
        url: String,
    },

    /// Malformed response body or image data.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Surface or encoding failure.
    #[error("Processing error: {0}")]
    Processing(String),

    /// A URL could not be parsed or is not allowed.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// Offending URL, truncated for inline data.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An operation exceeded its deadline.
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A composite was requested for an empty picture URL.
    #[error("Empty source URL")]
    EmptySource,

    /// Built outside a tokio runtime with none supplied.
    #[error("No tokio runtime available")]
    NoRuntime,

    /// A required builder component was not set.
    #[error("Missing component: {0}")]
    MissingComponent(&'static str),
}

impl From<reqwest::Error> for UserInfoError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            UserInfoError::Decode(err.to_string())
        } else {
            UserInfoError::Network(err.to_string())
        }
    }
}

impl From<image::ImageError> for UserInfoError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Decoding(_)
            | image::ImageError::Unsupported(_) => {
                UserInfoError::Decode(err.to_string())
            }
            other => UserInfoError::Processing(other.to_string()),
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, UserInfoError>;
