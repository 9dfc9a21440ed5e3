//! Error types for the audit log.

/// Errors that can occur during audit log operations.
#[derive(Debug, thiserror::Error)]
pub enum ObserveError {
    /// A database operation failed.
    #[error("audit log database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failed.
    #[error("audit log serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
