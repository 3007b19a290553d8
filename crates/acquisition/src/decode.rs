//! Decoding downloaded scene files into rasters.

use std::path::Path;

use goes_common::{GeometryTable, PipelineError, PipelineResult, Raster, RasterShape, SceneRequest};
use netcdf_parser::{read_cmi, NetCdfError};
use tracing::debug;

/// Turns a downloaded scene file into a native-resolution raster.
///
/// Decoding is CPU-bound and synchronous; async callers run it on the
/// blocking pool.
pub trait SceneDecoder: Send + Sync {
    fn decode(&self, path: &Path, request: &SceneRequest) -> PipelineResult<Raster>;
}

/// Decodes ABI CMI NetCDF files with libnetcdf.
#[derive(Debug, Clone, Default)]
pub struct CmiDecoder {
    geometry: GeometryTable,
}

impl CmiDecoder {
    pub fn new(geometry: GeometryTable) -> Self {
        Self { geometry }
    }
}

impl SceneDecoder for CmiDecoder {
    fn decode(&self, path: &Path, request: &SceneRequest) -> PipelineResult<Raster> {
        let scene = read_cmi(path).map_err(map_netcdf_error)?;

        let shape = RasterShape::new(scene.header.height, scene.header.width);
        let expected = self.geometry.native_shape(request);
        if shape != expected {
            return Err(PipelineError::CorruptData(format!(
                "{} is {}, {} needs {}",
                path.display(),
                shape,
                request.channel,
                expected
            )));
        }

        debug!(
            path = %path.display(),
            platform = scene.header.platform_id.as_deref().unwrap_or("unknown"),
            "Decoded scene"
        );
        Raster::new(shape, scene.data)
    }
}

fn map_netcdf_error(err: NetCdfError) -> PipelineError {
    if err.is_corrupt_file() {
        PipelineError::CorruptData(err.to_string())
    } else {
        // The file vanished or could not be read: not the scene's fault
        PipelineError::DownloadError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::sample_request;

    #[test]
    fn test_garbage_file_is_not_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.nc");
        std::fs::write(&path, b"definitely not netcdf").unwrap();

        let decoder = CmiDecoder::new(GeometryTable::fixed(8, 8));
        match decoder.decode(&path, &sample_request()) {
            Err(PipelineError::CorruptData(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_error_mapping() {
        let corrupt = map_netcdf_error(NetCdfError::InvalidFormat("bad".into()));
        assert!(matches!(corrupt, PipelineError::CorruptData(_)));

        let missing = map_netcdf_error(NetCdfError::MissingData("CMI".into()));
        assert!(matches!(missing, PipelineError::CorruptData(_)));

        let vanished = map_netcdf_error(NetCdfError::IoError(std::io::ErrorKind::NotFound.into()));
        assert!(matches!(vanished, PipelineError::DownloadError(_)));
    }
}
