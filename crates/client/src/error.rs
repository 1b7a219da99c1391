//! Client error types

/// Errors from the request/response API surface
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response from server")]
    InvalidResponse,
}

impl ClientError {
    /// Returns true if this error is transient and the call is safe to retry
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Http(_) => true,
            ClientError::Api { status, .. } => *status == 429 || *status >= 500,
            ClientError::Json(_) => false,
            ClientError::InvalidResponse => false,
        }
    }
}

/// Result type for API operations
pub type ClientResult<T> = Result<T, ClientError>;
