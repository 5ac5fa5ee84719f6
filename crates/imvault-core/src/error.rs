//! Error types for imvault-core

use thiserror::Error;

/// Result type alias for archive operations
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Main error type for archive operations
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// The config document is not parseable JSON
    #[error("Invalid JSON in config: {0}")]
    ConfigParse(String),

    /// The config document carries no usable key field
    #[error("No 'key' field found in config. This may not be a Signal Desktop config.json")]
    MissingKey,

    /// The key contains characters outside the hex alphabet (or is empty)
    #[error("Invalid key format: key must be hexadecimal (0-9, a-f). Current length: {length}")]
    InvalidKeyFormat { length: usize },

    /// The key is valid hex but not the required 64 characters
    #[error("Invalid key length: expected {expected} hex characters, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// The config only carries a keyring-wrapped key
    #[error(
        "Encrypted key format detected ({backend}). Unwrapping requires the OS keyring of the \
         machine that produced the archive; extract the plain hex key there and supply it via \
         the 'key' field"
    )]
    UnsupportedKeyWrapping { backend: String },

    /// The store could not be read with the supplied key
    #[error("Failed to decrypt archive. Ensure the database file and key belong together: {0}")]
    DecryptionFailed(String),

    /// The session was closed, or superseded by a newer open
    #[error("Session is not open")]
    SessionNotOpen,

    /// Pagination arguments out of range
    #[error("Invalid pagination: {0}")]
    InvalidPagination(String),

    /// Underlying store I/O or SQL failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<rusqlite::Error> for ArchiveError {
    fn from(err: rusqlite::Error) -> Self {
        ArchiveError::Storage(err.to_string())
    }
}
