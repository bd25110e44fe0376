//! Error types for the content-store client

use thiserror::Error;

/// Content-store client error
#[derive(Debug, Error)]
pub enum IpfsError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body was not the expected JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Proxy returned an error status
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// No content stored under the hash
    #[error("Content not found: {0}")]
    NotFound(String),

    /// Proxy answered with something other than the documented shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Result type for content-store operations
pub type Result<T> = std::result::Result<T, IpfsError>;
