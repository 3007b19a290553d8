//! NaN-aware mean compositing.
//!
//! An accumulator keeps a running per-pixel sum and a per-pixel count of
//! valid (non-NaN) contributions. NaN inputs are skipped, never treated as
//! zero, and pixels that never saw a valid value finalize to NaN.

use std::sync::{Arc, Mutex};

use goes_common::{PipelineError, PipelineResult, Raster, RasterShape};

/// Running sum and valid-sample count for one composite.
#[derive(Debug, Clone)]
pub struct CompositeAccumulator {
    shape: RasterShape,
    sum: Vec<f64>,
    count: Vec<u32>,
    merged: usize,
}

impl CompositeAccumulator {
    /// Empty accumulator for rasters of the given shape.
    pub fn new(shape: RasterShape) -> Self {
        Self {
            shape,
            sum: vec![0.0; shape.len()],
            count: vec![0; shape.len()],
            merged: 0,
        }
    }

    pub fn shape(&self) -> RasterShape {
        self.shape
    }

    /// Number of rasters merged so far.
    pub fn merged(&self) -> usize {
        self.merged
    }

    /// Per-pixel valid-sample counts, row-major.
    pub fn counts(&self) -> &[u32] {
        &self.count
    }

    pub fn count_at(&self, row: usize, col: usize) -> Option<u32> {
        if row >= self.shape.height || col >= self.shape.width {
            return None;
        }
        self.count.get(row * self.shape.width + col).copied()
    }

    /// Merge one raster into the running total.
    pub fn accumulate(&mut self, raster: &Raster) -> PipelineResult<()> {
        raster.ensure_shape(self.shape)?;

        for ((sum, count), &v) in self
            .sum
            .iter_mut()
            .zip(self.count.iter_mut())
            .zip(raster.data())
        {
            if !v.is_nan() {
                *sum += v as f64;
                *count += 1;
            }
        }
        self.merged += 1;
        Ok(())
    }

    /// Consuming form of [`accumulate`](Self::accumulate).
    pub fn with(mut self, raster: &Raster) -> PipelineResult<Self> {
        self.accumulate(raster)?;
        Ok(self)
    }

    /// Fold another partial accumulator of the same shape into this one.
    pub fn merge(&mut self, other: &CompositeAccumulator) -> PipelineResult<()> {
        if other.shape != self.shape {
            return Err(PipelineError::ShapeMismatch {
                expected: self.shape,
                actual: other.shape,
            });
        }
        for (a, b) in self.sum.iter_mut().zip(&other.sum) {
            *a += b;
        }
        for (a, b) in self.count.iter_mut().zip(&other.count) {
            *a += b;
        }
        self.merged += other.merged;
        Ok(())
    }

    /// Per-pixel mean; NaN where no valid sample was merged.
    pub fn finalize(&self) -> Raster {
        let data = self
            .sum
            .iter()
            .zip(&self.count)
            .map(|(&sum, &count)| {
                if count == 0 {
                    f32::NAN
                } else {
                    (sum / count as f64) as f32
                }
            })
            .collect();
        Raster::from_shape_vec(self.shape, data)
    }

    /// Smallest and largest per-pixel count.
    pub fn count_range(&self) -> (u32, u32) {
        let min = self.count.iter().copied().min().unwrap_or(0);
        let max = self.count.iter().copied().max().unwrap_or(0);
        (min, max)
    }
}

/// Accumulator shared between concurrent contributors.
///
/// The shape is taken from the first merged raster unless fixed up front;
/// each merge holds the lock for the duration of one raster.
#[derive(Debug, Clone, Default)]
pub struct SharedAccumulator {
    inner: Arc<Mutex<Option<CompositeAccumulator>>>,
}

impl SharedAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulator whose shape is known before any raster arrives.
    pub fn with_shape(shape: RasterShape) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(CompositeAccumulator::new(shape)))),
        }
    }

    pub fn accumulate(&self, raster: &Raster) -> PipelineResult<()> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let acc = guard.get_or_insert_with(|| CompositeAccumulator::new(raster.shape()));
        acc.accumulate(raster)
    }

    pub fn merged(&self) -> usize {
        let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().map(|acc| acc.merged()).unwrap_or(0)
    }

    /// Snapshot of the current accumulator, if any raster (or shape) was set.
    pub fn snapshot(&self) -> Option<CompositeAccumulator> {
        let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.clone()
    }

    /// Take the accumulator out, leaving this handle empty.
    pub fn take(&self) -> Option<CompositeAccumulator> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.take()
    }
}
