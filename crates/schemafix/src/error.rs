//! Error types for schema correction.

/// Errors that can occur while diffing or correcting a schema.
#[derive(Debug, thiserror::Error)]
pub enum CorrectError {
    /// Database error during introspection or plan execution.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A connection URL uses a scheme no supported dialect matches.
    #[error("Unsupported database URL scheme: {url}")]
    UnsupportedUrl {
        /// The offending connection URL.
        url: String,
    },

    /// Failed to serialize a plan document.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for schema correction operations.
pub type Result<T> = std::result::Result<T, CorrectError>;
