//! CMI decoding through libnetcdf.
//!
//! libnetcdf and HDF5 keep process-wide state and caches that grow with the
//! number of files opened, which is why the pipeline normally runs this
//! inside a short-lived `fetch-scene` child.

use std::path::Path;
use std::sync::Once;

use netcdf::AttributeValue;
use tracing::debug;

use crate::error::{NetCdfError, NetCdfResult};
use crate::header::{parse_coverage_start, CmiHeader};
use crate::CmiScene;

/// Turn off HDF5's automatic error stack printing.
///
/// Looking up optional attributes would otherwise dump `HDF5-DIAG` traces
/// on stderr. Call early, before the first file is opened.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: null handler and client data are the documented way to
        // disable automatic printing for the default error stack.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(hdf5_metno_sys::h5e::H5E_DEFAULT, None, std::ptr::null_mut());
        }
    });
}

/// Read and unpack the CMI variable of a file.
pub fn read_cmi<P: AsRef<Path>>(path: P) -> NetCdfResult<CmiScene> {
    let path = path.as_ref();
    silence_hdf5_errors();

    // A vanished file is the caller's problem, not a corrupt scene
    std::fs::metadata(path)?;

    let file = netcdf::open(path)
        .map_err(|e| NetCdfError::InvalidFormat(format!("cannot open {}: {}", path.display(), e)))?;

    let width = dimension_len(&file, "x")?;
    let height = dimension_len(&file, "y")?;

    let cmi = file
        .variable("CMI")
        .ok_or_else(|| NetCdfError::MissingData("CMI variable".to_string()))?;

    let header = CmiHeader {
        width,
        height,
        scale_factor: attr_f32(&cmi, "scale_factor").unwrap_or(1.0),
        add_offset: attr_f32(&cmi, "add_offset").unwrap_or(0.0),
        fill_value: attr_i32(&cmi, "_FillValue"),
        valid_range: valid_range(&cmi)?,
        unsigned: attr_str(&cmi, "_Unsigned").is_some_and(|v| v.eq_ignore_ascii_case("true")),
        platform_id: global_str(&file, "platform_ID"),
        scene_id: global_str(&file, "scene_id"),
        time_coverage_start: global_str(&file, "time_coverage_start").and_then(|v| parse_coverage_start(&v)),
    };

    let raw: Vec<i16> = cmi
        .get_values(..)
        .map_err(|e| NetCdfError::InvalidFormat(format!("unreadable CMI data: {}", e)))?;

    let expected = width
        .checked_mul(height)
        .ok_or_else(|| NetCdfError::InvalidFormat(format!("CMI is {}x{}", height, width)))?;
    if raw.len() != expected {
        return Err(NetCdfError::InvalidFormat(format!(
            "CMI has {} values, {}x{} needs {}",
            raw.len(),
            height,
            width,
            expected
        )));
    }

    let data = raw.iter().map(|&v| header.unpack(i32::from(v))).collect();
    debug!(
        path = %path.display(),
        width,
        height,
        platform = header.platform_id.as_deref().unwrap_or("unknown"),
        "Decoded CMI"
    );
    Ok(CmiScene { header, data })
}

fn dimension_len(file: &netcdf::File, name: &str) -> NetCdfResult<usize> {
    file.dimension(name)
        .map(|d| d.len())
        .ok_or_else(|| NetCdfError::MissingData(format!("dimension {}", name)))
}

fn attr_value(var: &netcdf::Variable, name: &str) -> Option<AttributeValue> {
    // Checking first keeps libnetcdf from reporting a missing attribute
    if !var.attributes().any(|attr| attr.name() == name) {
        return None;
    }
    var.attribute_value(name)?.ok()
}

fn attr_f32(var: &netcdf::Variable, name: &str) -> Option<f32> {
    f32::try_from(attr_value(var, name)?).ok()
}

fn attr_i32(var: &netcdf::Variable, name: &str) -> Option<i32> {
    match attr_value(var, name)? {
        AttributeValue::Short(v) => Some(i32::from(v)),
        AttributeValue::Ushort(v) => Some(i32::from(v)),
        AttributeValue::Schar(v) => Some(i32::from(v)),
        AttributeValue::Uchar(v) => Some(i32::from(v)),
        AttributeValue::Int(v) => Some(v),
        _ => None,
    }
}

fn attr_str(var: &netcdf::Variable, name: &str) -> Option<String> {
    match attr_value(var, name)? {
        AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}

fn global_str(file: &netcdf::File, name: &str) -> Option<String> {
    match file.attribute(name)?.value().ok()? {
        AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}

fn valid_range(var: &netcdf::Variable) -> NetCdfResult<Option<(i32, i32)>> {
    let bounds: Vec<i32> = match attr_value(var, "valid_range") {
        None => return Ok(None),
        Some(AttributeValue::Shorts(v)) => v.into_iter().map(i32::from).collect(),
        Some(AttributeValue::Ushorts(v)) => v.into_iter().map(i32::from).collect(),
        Some(AttributeValue::Ints(v)) => v,
        Some(other) => {
            return Err(NetCdfError::InvalidFormat(format!(
                "CMI:valid_range has unexpected type {:?}",
                other
            )))
        }
    };
    match bounds.as_slice() {
        [lo, hi] => Ok(Some((*lo, *hi))),
        _ => Err(NetCdfError::InvalidFormat(format!(
            "CMI:valid_range has {} values",
            bounds.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::assert_approx_eq;

    /// 2x3 CMI grid packed the way ABI L2 files are.
    fn write_cmi(path: &Path, raw: &[i16]) {
        let mut file = netcdf::create(path).unwrap();
        file.add_dimension("y", 2).unwrap();
        file.add_dimension("x", 3).unwrap();
        file.add_attribute("platform_ID", "G16").unwrap();
        file.add_attribute("scene_id", "CONUS").unwrap();
        file.add_attribute("time_coverage_start", "2019-03-01T17:01:39.4Z").unwrap();

        let mut cmi = file.add_variable::<i16>("CMI", &["y", "x"]).unwrap();
        cmi.set_fill_value(-1i16).unwrap();
        cmi.put_attribute("_Unsigned", "true").unwrap();
        cmi.put_attribute("valid_range", vec![0i16, 4095]).unwrap();
        cmi.put_attribute("scale_factor", 0.5f32).unwrap();
        cmi.put_attribute("add_offset", 100.0f32).unwrap();
        cmi.put_values(raw, ..).unwrap();
    }

    #[test]
    fn test_read_cmi_unpacks_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmi.nc");
        write_cmi(&path, &[-1, 0, 10, 4095, 5000, 2]);

        let scene = read_cmi(&path).unwrap();
        assert_eq!((scene.header.height, scene.header.width), (2, 3));
        assert_eq!(scene.header.fill_value, Some(-1));
        assert_eq!(scene.header.valid_range, Some((0, 4095)));
        assert!(scene.header.unsigned);
        assert_eq!(scene.header.platform_id.as_deref(), Some("G16"));
        assert_eq!(scene.header.scene_id.as_deref(), Some("CONUS"));
        assert!(scene.header.time_coverage_start.is_some());

        assert!(scene.data[0].is_nan());
        assert_eq!(scene.data[1], 100.0);
        assert_eq!(scene.data[2], 105.0);
        assert_approx_eq!(scene.data[3], 100.0 + 4095.0 * 0.5, 1e-3);
        // Outside valid_range
        assert!(scene.data[4].is_nan());
        assert_eq!(scene.data[5], 101.0);
    }

    #[test]
    fn test_missing_cmi_variable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rad.nc");
        {
            let mut file = netcdf::create(&path).unwrap();
            file.add_dimension("y", 1).unwrap();
            file.add_dimension("x", 1).unwrap();
            file.add_variable::<i16>("Rad", &["y", "x"]).unwrap();
        }

        let err = read_cmi(&path).unwrap_err();
        assert!(matches!(err, NetCdfError::MissingData(_)));
        assert!(err.is_corrupt_file());
    }

    #[test]
    fn test_garbage_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.nc");
        std::fs::write(&path, b"definitely not netcdf").unwrap();

        let err = read_cmi(&path).unwrap_err();
        assert!(matches!(err, NetCdfError::InvalidFormat(_)));
        assert!(err.is_corrupt_file());
    }

    #[test]
    fn test_truncated_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmi.nc");
        write_cmi(&path, &[1, 2, 3, 4, 5, 6]);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() / 3]).unwrap();

        assert!(read_cmi(&path).unwrap_err().is_corrupt_file());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = read_cmi("/nonexistent/cmi.nc").unwrap_err();
        assert!(matches!(err, NetCdfError::IoError(_)));
        assert!(!err.is_corrupt_file());
    }

    #[test]
    fn test_read_real_file() {
        let path = test_utils::require_test_file!("cmi_c13_sample.nc");
        let scene = read_cmi(path).unwrap();
        assert_eq!(scene.data.len(), scene.header.width * scene.header.height);
    }
}
