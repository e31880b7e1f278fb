//! Error types for warehouse-sync

use thiserror::Error;
use warehouse_domain::ValidationError;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Main error type returned by the entity stores
#[derive(Error, Debug)]
pub enum SyncError {
    /// Input rejected before any mutation was attempted
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A remote call failed; the optimistic change has been rolled back
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Local cache failure
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Configuration could not be loaded
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Backup document could not be read or written
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),
}

/// Failures reported by a remote backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Network, transport or authentication failure
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the write (constraint or validation failure)
    #[error("remote rejected the request: {0}")]
    Rejected(String),
}

impl RemoteError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, RemoteError::Unavailable(_))
    }
}

/// Local storage failures
#[derive(Error, Debug)]
pub enum CacheError {
    /// The storage backend failed
    #[error("storage error: {0}")]
    Storage(String),

    /// Persisted JSON could not be parsed
    #[error("parse error for key '{key}': {message}")]
    Parse { key: String, message: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A value is out of its valid range
    #[error("Invalid value: {0}")]
    Invalid(String),
}

/// Export/import errors
#[derive(Error, Debug)]
pub enum TransferError {
    /// The backup is not a valid document
    #[error("invalid backup file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
