//! Integer-factor block coarsening of rasters.
//!
//! Each output pixel is the NaN-aware mean of a `factor x factor` input block.
//! Blocks hanging over the bottom/right edge use only their in-bounds pixels,
//! so the output shape is `(ceil(H/factor), ceil(W/factor))`.

use goes_common::{CoarsenFactor, Raster};
use rayon::prelude::*;

/// Coarsen a raster by one of the supported factors.
///
/// Factor 1 returns the input unchanged (the pixel buffer is shared).
pub fn coarsen(raster: &Raster, factor: CoarsenFactor) -> Raster {
    coarsen_by(raster, factor.get())
}

/// Coarsen a raster by an arbitrary positive factor.
pub fn coarsen_by(raster: &Raster, factor: usize) -> Raster {
    if factor <= 1 {
        return raster.clone();
    }

    let in_shape = raster.shape();
    let out_shape = in_shape.coarsened(factor);
    if out_shape.is_empty() {
        return Raster::filled(out_shape, f32::NAN);
    }

    let src = raster.data();
    let width = in_shape.width;
    let height = in_shape.height;
    let mut output = vec![f32::NAN; out_shape.len()];

    // Rows are independent, and each pixel sums in a fixed order,
    // so the result does not depend on thread scheduling.
    output
        .par_chunks_mut(out_shape.width)
        .enumerate()
        .for_each(|(out_y, row)| {
            let y0 = out_y * factor;
            let y1 = (y0 + factor).min(height);
            for (out_x, pixel) in row.iter_mut().enumerate() {
                let x0 = out_x * factor;
                let x1 = (x0 + factor).min(width);
                *pixel = block_mean(src, width, y0, y1, x0, x1);
            }
        });

    Raster::from_shape_vec(out_shape, output)
}

/// Mean of the valid values in rows `y0..y1`, columns `x0..x1`.
///
/// If all values are NaN, returns NaN.
#[inline]
fn block_mean(data: &[f32], width: usize, y0: usize, y1: usize, x0: usize, x1: usize) -> f32 {
    let mut sum = 0.0f64;
    let mut count = 0u32;

    for y in y0..y1 {
        let row = &data[y * width + x0..y * width + x1];
        for &v in row {
            if !v.is_nan() {
                sum += v as f64;
                count += 1;
            }
        }
    }

    if count == 0 {
        f32::NAN
    } else {
        (sum / count as f64) as f32
    }
}
