use thiserror::Error;

/// A rejected peer specification or certificate upload.
///
/// Carries the offending field so the API can report it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Name of the rejected field (e.g. `"port"`).
    pub field: &'static str,
    /// Human-readable reason.
    pub message: String,
}

impl ValidationError {
    pub(crate) fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Errors returned by registry and credential store operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The input failed validation; nothing was persisted.
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// No peer with this id exists.
    #[error("federation peer not found: {0}")]
    NotFound(i64),

    /// The underlying SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Stored JSON could not be encoded or decoded.
    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
