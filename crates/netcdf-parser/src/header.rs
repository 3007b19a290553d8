//! Packing and provenance metadata of the ABI `CMI` variable.

use chrono::{DateTime, Utc};

/// Packing and provenance of the `CMI` variable.
#[derive(Debug, Clone, PartialEq)]
pub struct CmiHeader {
    pub width: usize,
    pub height: usize,
    pub scale_factor: f32,
    pub add_offset: f32,
    pub fill_value: Option<i32>,
    /// Inclusive raw range; packed values outside it are invalid.
    pub valid_range: Option<(i32, i32)>,
    /// Raw values are 16-bit unsigned stored in a signed short.
    pub unsigned: bool,
    /// e.g. "G16"
    pub platform_id: Option<String>,
    /// e.g. "Full Disk", "CONUS", "Mesoscale"
    pub scene_id: Option<String>,
    pub time_coverage_start: Option<DateTime<Utc>>,
}

impl CmiHeader {
    /// Header of an unpacked grid: identity scaling, no fill, no range.
    pub fn plain(height: usize, width: usize) -> Self {
        Self {
            width,
            height,
            scale_factor: 1.0,
            add_offset: 0.0,
            fill_value: None,
            valid_range: None,
            unsigned: false,
            platform_id: None,
            scene_id: None,
            time_coverage_start: None,
        }
    }

    /// Map a packed value to its physical value; NaN for fill or out-of-range.
    pub fn unpack(&self, raw: i32) -> f32 {
        let raw = self.normalize(raw);
        if self.fill_value.map(|f| self.normalize(f)) == Some(raw) {
            return f32::NAN;
        }
        if let Some((lo, hi)) = self.valid_range {
            if raw < self.normalize(lo) || raw > self.normalize(hi) {
                return f32::NAN;
            }
        }
        raw as f32 * self.scale_factor + self.add_offset
    }

    fn normalize(&self, raw: i32) -> i32 {
        if self.unsigned && raw < 0 {
            raw + 65536
        } else {
            raw
        }
    }
}

/// Parse the `time_coverage_start` global, e.g. "2019-03-01T17:00:21.4Z".
pub(crate) fn parse_coverage_start(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
