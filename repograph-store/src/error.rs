//! Error types for repograph-store

use thiserror::Error;

/// Errors that can occur in the graph store
#[derive(Debug, Error)]
pub enum StoreError {
    /// RocksDB error
    #[error("Storage error: {0}")]
    Storage(#[from] rocksdb::Error),

    /// Serialization error (bincode)
    #[error("Serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Key that cannot be encoded
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// On-disk schema written by an unknown version
    #[error("Incompatible schema version {found} (supported: {supported})")]
    IncompatibleSchema { found: u32, supported: u32 },

    /// Store temporarily unable to accept writes
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    /// Create an invalid key error
    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    /// Create an unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incompatible_schema_display() {
        let err = StoreError::IncompatibleSchema {
            found: 9,
            supported: 1,
        };
        assert_eq!(
            err.to_string(),
            "Incompatible schema version 9 (supported: 1)"
        );
    }

    #[test]
    fn test_helper_constructors() {
        assert_eq!(
            StoreError::unavailable("pool closed").to_string(),
            "Store unavailable: pool closed"
        );
        assert_eq!(
            StoreError::invalid_key("nul byte").to_string(),
            "Invalid key: nul byte"
        );
        assert_eq!(StoreError::other("boom").to_string(), "boom");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: StoreError = io_err.into();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
