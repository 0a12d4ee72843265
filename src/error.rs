use thiserror::Error;

/// Errors raised by backing store implementations.
///
/// These never leave a [`Bucket`](crate::bucket::Bucket); they are logged and
/// translated into a [`GridError`] at the bucket boundary.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum GridError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),
    #[error("Write error: {0}")]
    Write(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Integrity error: {0}")]
    Integrity(String),
}

impl GridError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GridError::NotFound(_))
    }

    /// Translate a backend failure from a read path.
    pub(crate) fn from_read(context: &str, err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => GridError::NotFound(what),
            StorageError::DuplicateKey(what) => GridError::DuplicateKey(what),
            StorageError::Serialization(e) => {
                tracing::error!(error = %e, "{} found a corrupt record", context);
                GridError::Integrity(format!("{}: {}", context, e))
            }
            other => {
                tracing::error!(error = %other, "{} failed", context);
                GridError::Connection(format!("{}: {}", context, other))
            }
        }
    }

    /// Translate a backend failure from a write path.
    pub(crate) fn from_write(context: &str, err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => GridError::NotFound(what),
            StorageError::DuplicateKey(what) => {
                tracing::warn!(key = %what, "{} rejected duplicate key", context);
                GridError::DuplicateKey(what)
            }
            StorageError::Unavailable(reason) => {
                tracing::error!(%reason, "{} failed, store unavailable", context);
                GridError::Connection(format!("{}: {}", context, reason))
            }
            other => {
                tracing::error!(error = %other, "{} failed", context);
                GridError::Write(format!("{}: {}", context, other))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, GridError>;
