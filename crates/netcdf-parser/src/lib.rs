//! NetCDF decoding of GOES-R ABI Cloud and Moisture Imagery (CMI).
//!
//! # GOES-R ABI Data Structure
//!
//! `CMI(y, x)` is a packed 16-bit grid holding either reflectance factors
//! (bands 1-6) or brightness temperatures in Kelvin (bands 7-16). Physical
//! values are `raw * scale_factor + add_offset`; fill values and anything
//! outside `valid_range` (off-disk space pixels, bad scans) decode to NaN.

pub mod error;
pub mod header;
pub mod native;

pub use error::{NetCdfError, NetCdfResult};
pub use header::CmiHeader;
pub use native::{read_cmi, silence_hdf5_errors};

/// A decoded CMI grid.
#[derive(Debug, Clone)]
pub struct CmiScene {
    pub header: CmiHeader,
    /// Row-major physical values, NaN where missing.
    pub data: Vec<f32>,
}
