//! Error types for the climatology pipeline.

use thiserror::Error;

use crate::raster::RasterShape;

/// Result type alias using PipelineError.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Primary error type for pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    // === Request Errors ===
    #[error("Invalid composite request: {0}")]
    InvalidSpec(String),

    // === Per-scene Errors ===
    #[error("Scene not found: {0}")]
    SceneNotFound(String),

    #[error("Download failed: {0}")]
    DownloadError(String),

    #[error("Corrupt scene data: {0}")]
    CorruptData(String),

    // === Data Integrity Errors ===
    #[error("Raster shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch {
        expected: RasterShape,
        actual: RasterShape,
    },

    #[error("Incomplete sequence: required {required} frames, produced {produced}")]
    IncompleteSequence { required: usize, produced: usize },

    // === Storage Errors ===
    #[error("Cache write failed: {0}")]
    WriteError(String),

    // === Infrastructure Errors ===
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Whether this error only affects a single timestamp and the run may continue.
    pub fn is_per_scene(&self) -> bool {
        matches!(
            self,
            PipelineError::SceneNotFound(_)
                | PipelineError::DownloadError(_)
                | PipelineError::CorruptData(_)
        )
    }

    /// Shorthand for an InvalidSpec error.
    pub fn invalid_spec(msg: impl Into<String>) -> Self {
        Self::InvalidSpec(msg.into())
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Internal(format!("JSON error: {}", err))
    }
}
