//! Cache error types.

use goes_common::PipelineError;
use thiserror::Error;

pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    /// The blob store rejected a read, list or delete.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A blob could not be decoded as a cache entry.
    #[error("Invalid cache entry: {0}")]
    Codec(String),

    /// Persisting an entry failed.
    #[error("Cache write failed: {0}")]
    Write(String),
}

impl From<CacheError> for PipelineError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Write(msg) => PipelineError::WriteError(msg),
            other => PipelineError::Io(other.to_string()),
        }
    }
}
