//! Immutable 2D grids with NaN as the "no data" sentinel.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Grid dimensions in rows and columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RasterShape {
    pub height: usize,
    pub width: usize,
}

impl RasterShape {
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    pub fn len(&self) -> usize {
        self.height * self.width
    }

    /// Pixel count, or `None` when it does not fit in `usize`.
    pub fn checked_len(&self) -> Option<usize> {
        self.height.checked_mul(self.width)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shape after block coarsening by `factor` (ceil division).
    pub fn coarsened(&self, factor: usize) -> Self {
        let factor = factor.max(1);
        Self {
            height: self.height.div_ceil(factor),
            width: self.width.div_ceil(factor),
        }
    }
}

impl fmt::Display for RasterShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.height, self.width)
    }
}

/// Row-major f32 grid. Missing pixels are NaN, never zero.
///
/// Cloning is cheap; the pixel buffer is shared.
#[derive(Debug, Clone)]
pub struct Raster {
    shape: RasterShape,
    data: Arc<Vec<f32>>,
}

impl Raster {
    /// Wrap a row-major buffer, checking its length against the shape.
    pub fn new(shape: RasterShape, data: Vec<f32>) -> PipelineResult<Self> {
        if shape.checked_len() != Some(data.len()) {
            return Err(PipelineError::Internal(format!(
                "raster {} cannot hold {} values",
                shape,
                data.len()
            )));
        }
        Ok(Self {
            shape,
            data: Arc::new(data),
        })
    }

    /// Build a raster from a buffer computed for exactly this shape.
    ///
    /// # Panics
    /// Panics if `data.len() != shape.len()`.
    pub fn from_shape_vec(shape: RasterShape, data: Vec<f32>) -> Self {
        assert_eq!(data.len(), shape.len(), "buffer length does not match {}", shape);
        Self {
            shape,
            data: Arc::new(data),
        }
    }

    /// A raster with every pixel set to `value`.
    pub fn filled(shape: RasterShape, value: f32) -> Self {
        Self {
            shape,
            data: Arc::new(vec![value; shape.len()]),
        }
    }

    pub fn shape(&self) -> RasterShape {
        self.shape
    }

    pub fn height(&self) -> usize {
        self.shape.height
    }

    pub fn width(&self) -> usize {
        self.shape.width
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row >= self.shape.height || col >= self.shape.width {
            return None;
        }
        self.data.get(row * self.shape.width + col).copied()
    }

    /// Number of non-NaN pixels.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }

    /// Fails with ShapeMismatch unless this raster has the expected shape.
    pub fn ensure_shape(&self, expected: RasterShape) -> PipelineResult<()> {
        if self.shape != expected {
            return Err(PipelineError::ShapeMismatch {
                expected,
                actual: self.shape,
            });
        }
        Ok(())
    }

    /// Bit-for-bit equality, treating identical NaN payloads as equal.
    pub fn bitwise_eq(&self, other: &Raster) -> bool {
        self.shape == other.shape
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_checks_length() {
        assert!(Raster::new(RasterShape::new(2, 3), vec![0.0; 6]).is_ok());
        assert!(Raster::new(RasterShape::new(2, 3), vec![0.0; 5]).is_err());
    }

    #[test]
    fn test_coarsened_shape_rounds_up() {
        let shape = RasterShape::new(5, 5);
        assert_eq!(shape.coarsened(2), RasterShape::new(3, 3));
        assert_eq!(shape.coarsened(1), shape);
        assert_eq!(RasterShape::new(1500, 2500).coarsened(8), RasterShape::new(188, 313));
    }

    #[test]
    fn test_valid_count_ignores_nan() {
        let r = Raster::new(RasterShape::new(1, 4), vec![1.0, f32::NAN, 0.0, f32::NAN]).unwrap();
        assert_eq!(r.valid_count(), 2);
    }

    #[test]
    fn test_bitwise_eq_with_nan() {
        let a = Raster::new(RasterShape::new(1, 2), vec![f32::NAN, 1.0]).unwrap();
        let b = Raster::new(RasterShape::new(1, 2), vec![f32::NAN, 1.0]).unwrap();
        let c = Raster::new(RasterShape::new(2, 1), vec![f32::NAN, 1.0]).unwrap();
        assert!(a.bitwise_eq(&b));
        assert!(!a.bitwise_eq(&c));
    }

    #[test]
    fn test_ensure_shape() {
        let r = Raster::filled(RasterShape::new(2, 2), 1.0);
        assert!(r.ensure_shape(RasterShape::new(2, 2)).is_ok());
        assert!(matches!(
            r.ensure_shape(RasterShape::new(3, 2)),
            Err(PipelineError::ShapeMismatch { .. })
        ));
    }
}
