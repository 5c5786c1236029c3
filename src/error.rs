//! Error types for the Tessera client

use thiserror::Error;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Client error types
#[derive(Error, Debug)]
pub enum Error {
    /// User-supplied parsed data violates the template/group schema.
    ///
    /// The `level` is a path into the offending value, e.g.
    /// `entry.blocks.2.title`.
    #[error("[{level}] {message}")]
    Validation { level: String, message: String },

    /// A name or id reference could not be resolved
    #[error("{kind} \"{query}\" not found")]
    Lookup { kind: &'static str, query: String },

    /// The backend rejected a request
    #[error("server responded with status {status}: {message}")]
    Server { status: u16, message: String },

    /// Network-level request failure
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Realtime channel failure
    #[error("realtime channel error: {0}")]
    Channel(String),
}

impl Error {
    pub(crate) fn validation(level: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            level: level.into(),
            message: message.into(),
        }
    }
}
