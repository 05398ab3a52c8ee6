//! Error type for the object storage gateway.

/// Result alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Storage errors.
///
/// `NotFound` is uniform. Callers cannot tell a malformed logical path from
/// a missing backend object.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StorageError {
    /// Object not found.
    #[error("object not found")]
    NotFound,

    /// Caller-supplied input the gateway refuses (e.g. a bad file extension).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Signed URL signature does not match.
    #[error("invalid signature")]
    InvalidSignature,

    /// Signed URL is past its expiry.
    #[error("signed URL expired")]
    Expired,

    /// Any other backend failure (network, permissions, quota). Not retried.
    #[error("storage backend error: {0:#}")]
    Backend(#[from] anyhow::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Backend(e.into())
    }
}
