use thiserror::Error;

/// Errors returned by workflow synchronization operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The backend returned a non-success HTTP status.
    #[error("Backend returned HTTP {status}: {detail}")]
    Http { status: u16, detail: String },

    /// The response from the backend was missing expected fields.
    #[error("{0}")]
    InvalidResponse(String),

    /// Network-level request failure with context.
    #[error("{context}: {source}")]
    Network {
        context: String,
        source: reqwest::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, SyncError>;
