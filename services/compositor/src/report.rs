//! Per-run report: what each frame asked for and what it got.

use std::path::Path;

use chrono::{DateTime, Utc};
use composite::{FrameLabel, FramePlan};
use goes_common::{PipelineResult, TimePoint};
use serde::{Deserialize, Serialize};
use storage::CacheStats;

/// Outcome class of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameStatus {
    /// Every requested sample was incorporated.
    Complete,
    /// Some samples were skipped; the composite averages fewer inputs.
    Degraded,
    /// No sample could be incorporated; the frame is missing.
    Empty,
    /// The composite was abandoned after a data-integrity error.
    Failed,
}

/// A sample that did not make it into the composites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedSample {
    pub time: TimePoint,
    /// `not_found`, `download_error`, `corrupt`, `shape_mismatch` or `interrupted`.
    pub reason: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameReport {
    pub label: FrameLabel,
    /// Human-readable label, e.g. `17:00Z`.
    pub name: String,
    pub requested: usize,
    pub incorporated: usize,
    pub skipped: Vec<SkippedSample>,
    pub status: FrameStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FrameReport {
    fn new(label: FrameLabel, requested: usize) -> Self {
        Self {
            label,
            name: label.to_string(),
            requested,
            incorporated: 0,
            skipped: Vec::new(),
            status: FrameStatus::Empty,
            error: None,
        }
    }

    fn settle(&mut self) {
        self.status = if self.error.is_some() {
            FrameStatus::Failed
        } else if self.incorporated == 0 {
            FrameStatus::Empty
        } else if self.incorporated == self.requested {
            FrameStatus::Complete
        } else {
            FrameStatus::Degraded
        };
    }
}

/// Summary of a pipeline run, written next to the frames as `report.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Unique scenes the plan needed.
    pub scenes_requested: usize,
    pub scenes_from_cache: usize,
    pub scenes_fetched: usize,
    pub scenes_skipped: usize,
    /// The run was stopped before every scene was processed.
    pub interrupted: bool,
    pub frames: Vec<FrameReport>,
    pub cache: CacheStats,
}

impl RunReport {
    pub fn frames_with_status(&self, status: FrameStatus) -> usize {
        self.frames.iter().filter(|f| f.status == status).count()
    }

    /// Whether any frame averages fewer samples than requested.
    pub fn is_degraded(&self) -> bool {
        self.interrupted || self.frames.iter().any(|f| f.status != FrameStatus::Complete)
    }

    pub fn write_json(&self, path: &Path) -> PipelineResult<()> {
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Collects sample outcomes into a [`RunReport`].
#[derive(Debug)]
pub(crate) struct ReportBuilder {
    started_at: DateTime<Utc>,
    scenes_requested: usize,
    scenes_from_cache: usize,
    scenes_fetched: usize,
    scenes_skipped: usize,
    interrupted: bool,
    frames: Vec<FrameReport>,
}

impl ReportBuilder {
    pub(crate) fn new(plan: &FramePlan) -> Self {
        Self {
            started_at: Utc::now(),
            scenes_requested: plan.timepoints.len(),
            scenes_from_cache: 0,
            scenes_fetched: 0,
            scenes_skipped: 0,
            interrupted: false,
            frames: plan
                .frames
                .iter()
                .map(|f| FrameReport::new(f.label, f.members.len()))
                .collect(),
        }
    }

    pub(crate) fn incorporated(&mut self, frames: &[usize], from_cache: bool) {
        if from_cache {
            self.scenes_from_cache += 1;
        } else {
            self.scenes_fetched += 1;
        }
        for &i in frames {
            if let Some(frame) = self.frames.get_mut(i) {
                frame.incorporated += 1;
            }
        }
    }

    pub(crate) fn skipped(&mut self, frames: &[usize], sample: SkippedSample) {
        self.scenes_skipped += 1;
        for &i in frames {
            if let Some(frame) = self.frames.get_mut(i) {
                frame.skipped.push(sample.clone());
            }
        }
    }

    /// Mark frames as failed; the first error is kept.
    pub(crate) fn failed(&mut self, frames: &[usize], error: &str) {
        for &i in frames {
            if let Some(frame) = self.frames.get_mut(i) {
                frame.error.get_or_insert_with(|| error.to_string());
            }
        }
    }

    pub(crate) fn is_failed(&self, frame: usize) -> bool {
        self.frames.get(frame).map(|f| f.error.is_some()).unwrap_or(false)
    }

    pub(crate) fn interrupted(&mut self) {
        self.interrupted = true;
    }

    pub(crate) fn finish(mut self, cache: CacheStats) -> RunReport {
        for frame in &mut self.frames {
            frame.skipped.sort_by_key(|s| s.time);
            frame.settle();
        }
        RunReport {
            started_at: self.started_at,
            finished_at: Utc::now(),
            scenes_requested: self.scenes_requested,
            scenes_from_cache: self.scenes_from_cache,
            scenes_fetched: self.scenes_fetched,
            scenes_skipped: self.scenes_skipped,
            interrupted: self.interrupted,
            frames: self.frames,
            cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use composite::PlannedFrame;

    fn tp(year: i32, hour: u32) -> TimePoint {
        TimePoint::new(year, 3, 1, hour, 0).unwrap()
    }

    fn plan() -> FramePlan {
        let frames = (0..3)
            .map(|hour| PlannedFrame {
                label: FrameLabel::TimeOfDay { hour, minute: 0 },
                members: vec![tp(2019, hour), tp(2020, hour)],
            })
            .collect();
        FramePlan {
            frames,
            timepoints: (0..3).flat_map(|h| [tp(2019, h), tp(2020, h)]).collect(),
        }
    }

    fn skip(time: TimePoint) -> SkippedSample {
        SkippedSample {
            time,
            reason: "not_found".into(),
            message: "no scan".into(),
        }
    }

    #[test]
    fn test_frame_statuses() {
        let mut builder = ReportBuilder::new(&plan());
        builder.incorporated(&[0], false);
        builder.incorporated(&[0], true);
        builder.incorporated(&[1], false);
        builder.skipped(&[1], skip(tp(2020, 1)));
        builder.skipped(&[2], skip(tp(2019, 2)));
        builder.skipped(&[2], skip(tp(2020, 2)));

        let report = builder.finish(CacheStats::default());

        assert_eq!(report.frames[0].status, FrameStatus::Complete);
        assert_eq!(report.frames[1].status, FrameStatus::Degraded);
        assert_eq!(report.frames[1].skipped.len(), 1);
        assert_eq!(report.frames[2].status, FrameStatus::Empty);
        assert_eq!(report.scenes_requested, 6);
        assert_eq!(report.scenes_from_cache, 1);
        assert_eq!(report.scenes_skipped, 3);
        assert!(report.is_degraded());
    }

    #[test]
    fn test_failure_wins_over_samples() {
        let mut builder = ReportBuilder::new(&plan());
        builder.incorporated(&[0], false);
        builder.failed(&[0], "shape mismatch");
        builder.failed(&[0], "second error");
        assert!(builder.is_failed(0));
        assert!(!builder.is_failed(1));

        let report = builder.finish(CacheStats::default());
        assert_eq!(report.frames[0].status, FrameStatus::Failed);
        assert_eq!(report.frames[0].error.as_deref(), Some("shape mismatch"));
    }

    #[test]
    fn test_report_json_shape() {
        let report = ReportBuilder::new(&plan()).finish(CacheStats::default());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["frames"][0]["name"], "00:00Z");
        assert_eq!(json["frames"][0]["label"]["kind"], "time_of_day");
        assert_eq!(json["frames"][0]["status"], "empty");
        assert!(json["frames"][0].get("error").is_none());
    }
}
