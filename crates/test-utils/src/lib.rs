//! Dev-only helpers shared by the workspace's test suites: synthetic
//! rasters, scene request fixtures, sample-file lookup, and float
//! assertions that understand NaN.

pub mod fixtures;
pub mod generators;
pub mod paths;

pub use fixtures::*;
pub use generators::*;
pub use paths::*;

/// Resolve a sample file via [`find_test_file`], or end the calling test
/// early when it is absent.
///
/// Real CMI scenes are hundreds of megabytes and never checked in.
///
/// ```ignore
/// #[test]
/// fn test_decodes_real_scene() {
///     let path = test_utils::require_test_file!("OR_ABI-L2-CMIPC-M6C13_G16_sample.nc");
/// }
/// ```
#[macro_export]
macro_rules! require_test_file {
    ($name:expr) => {{
        let Some(path) = $crate::find_test_file($name) else {
            eprintln!("skipping: sample file {} not present (set TEST_DATA_DIR)", $name);
            return;
        };
        path
    }};
}

/// Panics unless `|left - right| <= tolerance`, comparing as f64.
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $tolerance:expr) => {{
        let (l, r, tol) = ($left as f64, $right as f64, $tolerance as f64);
        if !((l - r).abs() <= tol) {
            panic!(
                "assertion failed: {} and {} differ by {} (tolerance {})",
                l,
                r,
                (l - r).abs(),
                tol
            );
        }
    }};
}

/// Pixel-wise approximate equality of two rasters.
///
/// Shapes must match, NaN must line up with NaN, and every other pair of
/// pixels must be within `tolerance`.
#[macro_export]
macro_rules! assert_raster_approx_eq {
    ($left:expr, $right:expr, $tolerance:expr) => {{
        let (left, right) = (&$left, &$right);
        assert_eq!(left.shape(), right.shape(), "raster shapes differ");
        for (i, (a, b)) in left.data().iter().zip(right.data()).enumerate() {
            match (a.is_nan(), b.is_nan()) {
                (true, true) => {}
                (false, false) => {
                    let diff = (*a as f64 - *b as f64).abs();
                    if diff > $tolerance as f64 {
                        panic!("assertion failed: pixel {} is {} vs {} (diff {})", i, a, b, diff);
                    }
                }
                _ => panic!("assertion failed: NaN mismatch at pixel {} ({} vs {})", i, a, b),
            }
        }
    }};
}

#[cfg(test)]
mod tests {
    use goes_common::{Raster, RasterShape};

    #[test]
    fn test_approx_eq_within_tolerance() {
        assert_approx_eq!(2.00049_f32, 2.0_f32, 5e-4);
        assert_approx_eq!(-0.0, 0.0, 0.0);
    }

    #[test]
    #[should_panic(expected = "differ by")]
    fn test_approx_eq_outside_tolerance() {
        assert_approx_eq!(285.3, 285.0, 0.1);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_approx_eq_rejects_nan() {
        assert_approx_eq!(f64::NAN, 1.0, 10.0);
    }

    #[test]
    fn test_raster_approx_eq_passes_with_nan() {
        let a = Raster::new(RasterShape::new(1, 3), vec![1.0, f32::NAN, 3.0]).unwrap();
        let b = Raster::new(RasterShape::new(1, 3), vec![1.00001, f32::NAN, 3.0]).unwrap();
        assert_raster_approx_eq!(a, b, 0.001);
    }

    #[test]
    #[should_panic(expected = "NaN mismatch")]
    fn test_raster_approx_eq_nan_mismatch() {
        let a = Raster::new(RasterShape::new(1, 2), vec![1.0, f32::NAN]).unwrap();
        let b = Raster::new(RasterShape::new(1, 2), vec![1.0, 0.0]).unwrap();
        assert_raster_approx_eq!(a, b, 0.001);
    }
}
