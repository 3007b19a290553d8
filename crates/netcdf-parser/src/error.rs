//! Errors raised while reading CMI files.

use thiserror::Error;

pub type NetCdfResult<T> = Result<T, NetCdfError>;

#[derive(Error, Debug)]
pub enum NetCdfError {
    #[error("I/O error reading scene file: {0}")]
    IoError(#[from] std::io::Error),

    /// A variable, dimension or attribute the CMI product always carries.
    #[error("CMI file lacks {0}")]
    MissingData(String),

    /// libnetcdf refused the file or its contents are inconsistent.
    #[error("Malformed CMI content: {0}")]
    InvalidFormat(String),
}

impl NetCdfError {
    /// Whether the file itself is at fault (as opposed to the environment).
    pub fn is_corrupt_file(&self) -> bool {
        matches!(self, NetCdfError::MissingData(_) | NetCdfError::InvalidFormat(_))
    }
}
