//! Backend-agnostic storage errors surfaced to the engine.

use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by session stores regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or rejected the request.
    #[error("{backend} storage unavailable: {message}")]
    Unavailable {
        backend: &'static str,
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// Another writer replaced the document between read and write.
    #[error("{backend} rejected a concurrent update of `{document}`")]
    Conflict {
        backend: &'static str,
        document: String,
    },
}

impl StorageError {
    /// Wrap any backend failure as an availability error.
    pub fn unavailable(backend: &'static str, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            backend,
            message: source.to_string(),
            source: Box::new(source),
        }
    }
}
