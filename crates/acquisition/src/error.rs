//! Acquisition error types.

use goes_common::PipelineError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by the archive collaborator.
#[derive(Debug, Clone, Error)]
pub enum ArchiveError {
    /// The archive has no scene for the request.
    #[error("No archive scene: {0}")]
    NotFound(String),

    /// Listing or download failed; may succeed on retry.
    #[error("Archive network error: {0}")]
    Network(String),
}

/// Why a scene could not be fetched. None of these are fatal to a run.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum FetchFailure {
    #[error("Scene not found: {0}")]
    SceneNotFound(String),

    #[error("Download failed: {0}")]
    DownloadError(String),

    #[error("Corrupt scene data: {0}")]
    CorruptData(String),
}

impl FetchFailure {
    /// Short label used for metrics and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchFailure::SceneNotFound(_) => "not_found",
            FetchFailure::DownloadError(_) => "download_error",
            FetchFailure::CorruptData(_) => "corrupt",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            FetchFailure::SceneNotFound(m)
            | FetchFailure::DownloadError(m)
            | FetchFailure::CorruptData(m) => m,
        }
    }

    /// Only transient download failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchFailure::DownloadError(_))
    }
}

impl From<ArchiveError> for FetchFailure {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::NotFound(msg) => FetchFailure::SceneNotFound(msg),
            ArchiveError::Network(msg) => FetchFailure::DownloadError(msg),
        }
    }
}

impl From<FetchFailure> for PipelineError {
    fn from(err: FetchFailure) -> Self {
        match err {
            FetchFailure::SceneNotFound(msg) => PipelineError::SceneNotFound(msg),
            FetchFailure::DownloadError(msg) => PipelineError::DownloadError(msg),
            FetchFailure::CorruptData(msg) => PipelineError::CorruptData(msg),
        }
    }
}

impl From<PipelineError> for FetchFailure {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::SceneNotFound(msg) => FetchFailure::SceneNotFound(msg),
            PipelineError::CorruptData(msg) => FetchFailure::CorruptData(msg),
            PipelineError::ShapeMismatch { expected, actual } => FetchFailure::CorruptData(format!(
                "decoded raster is {}, expected {}",
                actual, expected
            )),
            other => FetchFailure::DownloadError(other.to_string()),
        }
    }
}
