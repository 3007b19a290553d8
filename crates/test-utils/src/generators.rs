//! Synthetic rasters with known pixel values.

use goes_common::{Raster, RasterShape};

fn raster_from_fn(height: usize, width: usize, mut pixel: impl FnMut(usize, usize) -> f32) -> Raster {
    let data = (0..height)
        .flat_map(|row| (0..width).map(move |col| (row, col)))
        .map(|(row, col)| pixel(row, col))
        .collect();
    Raster::from_shape_vec(RasterShape::new(height, width), data)
}

/// Raster whose pixel at (row, col) is `col * 1000 + row`, so any
/// transposition or offset shows up in the values.
///
/// ```
/// use test_utils::create_test_raster;
///
/// let r = create_test_raster(5, 10);
/// assert_eq!(r.data().len(), 50);
/// assert_eq!(r.get(0, 1), Some(1000.0));
/// assert_eq!(r.get(1, 0), Some(1.0));
/// ```
pub fn create_test_raster(height: usize, width: usize) -> Raster {
    raster_from_fn(height, width, |row, col| (col * 1000 + row) as f32)
}

/// Brightness temperatures rising from 200K at the top-left corner toward
/// 300K at the bottom-right.
pub fn create_brightness_temperature_raster(height: usize, width: usize) -> Raster {
    let (h, w) = (height.max(1) as f32, width.max(1) as f32);
    raster_from_fn(height, width, |row, col| 200.0 + 50.0 * (col as f32 / w + row as f32 / h))
}

pub fn create_constant_raster(height: usize, width: usize, value: f32) -> Raster {
    Raster::filled(RasterShape::new(height, width), value)
}

/// Raster with every pixel missing.
pub fn create_nan_raster(height: usize, width: usize) -> Raster {
    Raster::filled(RasterShape::new(height, width), f32::NAN)
}

/// Zeros, with NaN at each in-bounds (row, col) of `nan_positions`.
pub fn create_raster_with_nans(height: usize, width: usize, nan_positions: &[(usize, usize)]) -> Raster {
    raster_from_fn(height, width, |row, col| {
        if nan_positions.contains(&(row, col)) {
            f32::NAN
        } else {
            0.0
        }
    })
}

/// Reproducible reflectance-like values in [0, 1) for a given `seed`.
///
/// About `nan_fraction` of the pixels are NaN, standing in for space
/// pixels and fill values.
pub fn create_random_raster(height: usize, width: usize, seed: u32, nan_fraction: f32) -> Raster {
    let nan_below = (nan_fraction.clamp(0.0, 1.0) as f64 * u32::MAX as f64) as u64;
    raster_from_fn(height, width, |row, col| {
        let bits = pixel_noise(seed, row, col);
        if (bits >> 32) < nan_below {
            f32::NAN
        } else {
            // 24 mantissa-sized bits keep the value strictly below 1.0
            (bits & 0x00ff_ffff) as f32 / (1u32 << 24) as f32
        }
    })
}

// splitmix64 over the pixel coordinates
fn pixel_noise(seed: u32, row: usize, col: usize) -> u64 {
    let mut z = ((seed as u64) << 40) ^ ((row as u64) << 20) ^ col as u64;
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
