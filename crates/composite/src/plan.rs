//! Grouping of enumerated time points into composite frames.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use goes_common::{PipelineError, PipelineResult, TimeOfDay, TimePoint};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::enumerate::CompositeSpec;

/// How seasonal frames advance through the year.
///
/// The right stride depends on how many frames the final animation should
/// have, so it is a policy rather than a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StridePolicy {
    /// Advance by exactly this many day positions.
    Fixed(usize),
    /// Pick `max(1, positions / n)` to land near `n` frames.
    TargetFrames(usize),
}

impl Default for StridePolicy {
    fn default() -> Self {
        StridePolicy::TargetFrames(40)
    }
}

impl StridePolicy {
    pub fn stride(&self, positions: usize) -> usize {
        match *self {
            StridePolicy::Fixed(n) => n.max(1),
            StridePolicy::TargetFrames(n) => (positions / n.max(1)).max(1),
        }
    }
}

/// How time points are grouped into frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CompositeMode {
    /// One frame per time of day, averaging all dates and years.
    DailyCycle,
    /// Sliding windows of `window` consecutive day positions around the year.
    SeasonalCycle {
        window: usize,
        #[serde(default)]
        stride: StridePolicy,
    },
    /// A single frame averaging every sample.
    Climatology,
    /// Frames averaging the first 1, 2, 4, 8, ... samples, then all of them.
    ///
    /// Samples are drawn in an order shuffled by `seed` so early frames
    /// already span the whole date range; `None` keeps enumeration order.
    Progressive {
        #[serde(default = "default_progressive_seed")]
        seed: Option<u64>,
    },
}

fn default_progressive_seed() -> Option<u64> {
    Some(42)
}

/// Ordering label of a composite frame.
///
/// Within one plan every label has the same variant; the derived ordering
/// is the sequence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameLabel {
    TimeOfDay {
        hour: u32,
        minute: u32,
    },
    DayWindow {
        index: usize,
        start_month: u32,
        start_day: u32,
        end_month: u32,
        end_day: u32,
    },
    Climatology,
    Progressive {
        samples: usize,
    },
}

impl fmt::Display for FrameLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameLabel::TimeOfDay { hour, minute } => write!(f, "{:02}:{:02}Z", hour, minute),
            FrameLabel::DayWindow {
                start_month,
                start_day,
                end_month,
                end_day,
                ..
            } => write!(
                f,
                "{:02}-{:02}..{:02}-{:02}",
                start_month, start_day, end_month, end_day
            ),
            FrameLabel::Climatology => f.write_str("climatology"),
            FrameLabel::Progressive { samples } => write!(f, "first-{}", samples),
        }
    }
}

/// One frame and the time points it averages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFrame {
    pub label: FrameLabel,
    pub members: Vec<TimePoint>,
}

/// Frames of a composite run plus the unique time points they need.
#[derive(Debug, Clone)]
pub struct FramePlan {
    pub frames: Vec<PlannedFrame>,
    /// Every time point used by at least one frame, in enumeration order.
    pub timepoints: Vec<TimePoint>,
}

impl FramePlan {
    pub fn labels(&self) -> Vec<FrameLabel> {
        self.frames.iter().map(|f| f.label).collect()
    }

    /// Indices of the frames that include a time point.
    pub fn frames_for(&self, time: &TimePoint) -> Vec<usize> {
        self.frames
            .iter()
            .enumerate()
            .filter(|(_, f)| f.members.binary_search(time).is_ok())
            .map(|(i, _)| i)
            .collect()
    }
}

/// Enumerate a request and group its time points into frames.
pub fn plan_frames(spec: &CompositeSpec, mode: &CompositeMode) -> PipelineResult<FramePlan> {
    let timepoints = spec.enumerate()?;

    let frames = match mode {
        CompositeMode::DailyCycle => daily_cycle(&timepoints),
        CompositeMode::SeasonalCycle { window, stride } => {
            seasonal_cycle(&timepoints, *window, *stride)?
        }
        CompositeMode::Climatology => vec![PlannedFrame {
            label: FrameLabel::Climatology,
            members: timepoints.clone(),
        }],
        CompositeMode::Progressive { seed } => progressive(&timepoints, *seed),
    };

    Ok(FramePlan { frames, timepoints })
}

fn daily_cycle(timepoints: &[TimePoint]) -> Vec<PlannedFrame> {
    let times: BTreeSet<TimeOfDay> = timepoints.iter().map(|t| t.time_of_day()).collect();
    times
        .into_iter()
        .map(|tod| PlannedFrame {
            label: FrameLabel::TimeOfDay {
                hour: tod.hour,
                minute: tod.minute,
            },
            members: timepoints
                .iter()
                .filter(|t| t.time_of_day() == tod)
                .copied()
                .collect(),
        })
        .collect()
}

fn seasonal_cycle(
    timepoints: &[TimePoint],
    window: usize,
    stride: StridePolicy,
) -> PipelineResult<Vec<PlannedFrame>> {
    let positions: Vec<(u32, u32)> = timepoints
        .iter()
        .map(|t| (t.month, t.day))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let n = positions.len();

    if window == 0 || window > n {
        return Err(PipelineError::invalid_spec(format!(
            "seasonal window must be 1-{} day positions, got {}",
            n, window
        )));
    }

    let step = stride.stride(n);
    let mut frames = Vec::new();
    for (index, start) in (0..n).step_by(step).enumerate() {
        // Windows wrap past December back to January.
        let in_window: HashSet<(u32, u32)> =
            (0..window).map(|i| positions[(start + i) % n]).collect();
        let (start_month, start_day) = positions[start];
        let (end_month, end_day) = positions[(start + window - 1) % n];

        frames.push(PlannedFrame {
            label: FrameLabel::DayWindow {
                index,
                start_month,
                start_day,
                end_month,
                end_day,
            },
            members: timepoints
                .iter()
                .filter(|t| in_window.contains(&(t.month, t.day)))
                .copied()
                .collect(),
        });
    }
    Ok(frames)
}

fn progressive(timepoints: &[TimePoint], seed: Option<u64>) -> Vec<PlannedFrame> {
    let mut order = timepoints.to_vec();
    if let Some(seed) = seed {
        order.shuffle(&mut StdRng::seed_from_u64(seed));
    }

    let total = order.len();
    let mut counts = Vec::new();
    let mut n = 1;
    while n <= total {
        counts.push(n);
        n *= 2;
    }
    if counts.last().is_some_and(|&last| last < total) {
        counts.push(total);
    }

    counts
        .into_iter()
        .map(|samples| {
            // frames_for binary-searches members
            let mut members = order[..samples].to_vec();
            members.sort();
            PlannedFrame {
                label: FrameLabel::Progressive { samples },
                members,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enumerate::{DaySelection, TimesOfDay, YearRange};
    use goes_common::Satellite;

    fn noon_spec(days: DaySelection, years: YearRange) -> CompositeSpec {
        CompositeSpec {
            years,
            days,
            times: TimesOfDay::LocalNoon {
                satellite: Satellite::East,
            },
        }
    }

    #[test]
    fn test_daily_cycle_hourly_has_24_frames() {
        let spec = CompositeSpec {
            years: YearRange::new(2018, 2024),
            days: DaySelection::MonthDays {
                months: vec![3],
                days: vec![1, 10, 20],
            },
            times: TimesOfDay::Hourly,
        };
        let plan = plan_frames(&spec, &CompositeMode::DailyCycle).unwrap();
        assert_eq!(plan.frames.len(), 24);
        assert!(plan.frames.iter().all(|f| f.members.len() == 7 * 3));
        assert_eq!(plan.frames[17].label, FrameLabel::TimeOfDay { hour: 17, minute: 0 });
    }

    #[test]
    fn test_seasonal_cycle_wraps_and_strides() {
        let spec = noon_spec(DaySelection::OddDays { months: vec![] }, YearRange::new(2019, 2019));
        let mode = CompositeMode::SeasonalCycle {
            window: 6,
            stride: StridePolicy::TargetFrames(40),
        };
        let plan = plan_frames(&spec, &mode).unwrap();

        // 2019 has 186 odd days; stride 186 / 40 = 4 -> 47 frames
        assert_eq!(plan.timepoints.len(), 186);
        assert_eq!(plan.frames.len(), 47);
        assert!(plan.frames.iter().all(|f| f.members.len() == 6));

        let last = plan.frames.last().unwrap();
        match last.label {
            FrameLabel::DayWindow {
                start_month,
                end_month,
                end_day,
                ..
            } => {
                assert_eq!(start_month, 12);
                // Dec 29, Dec 31, then Jan 1..7
                assert_eq!((end_month, end_day), (1, 7));
            }
            other => panic!("unexpected label {:?}", other),
        }
    }

    #[test]
    fn test_seasonal_window_too_large() {
        let spec = noon_spec(
            DaySelection::MonthDays {
                months: vec![1],
                days: vec![1, 2],
            },
            YearRange::new(2020, 2020),
        );
        let mode = CompositeMode::SeasonalCycle {
            window: 3,
            stride: StridePolicy::Fixed(1),
        };
        assert!(plan_frames(&spec, &mode).is_err());
    }

    fn half_year_spec() -> CompositeSpec {
        noon_spec(
            DaySelection::MonthDays {
                months: vec![1, 2, 3, 4, 5, 6],
                days: vec![1, 5, 10, 15, 20, 25],
            },
            YearRange::new(2019, 2019),
        )
    }

    #[test]
    fn test_progressive_counts() {
        let plan = plan_frames(&half_year_spec(), &CompositeMode::Progressive { seed: None }).unwrap();
        let counts: Vec<usize> = plan.frames.iter().map(|f| f.members.len()).collect();
        assert_eq!(counts, vec![1, 2, 4, 8, 16, 32, 36]);
        // Unshuffled frames are enumeration-order prefixes
        assert_eq!(plan.frames[3].members, plan.timepoints[..8].to_vec());
    }

    #[test]
    fn test_progressive_seed_is_deterministic() {
        let mode = CompositeMode::Progressive { seed: Some(42) };
        let a = plan_frames(&half_year_spec(), &mode).unwrap();
        let b = plan_frames(&half_year_spec(), &mode).unwrap();
        assert_eq!(a.frames, b.frames);

        let chronological = plan_frames(&half_year_spec(), &CompositeMode::Progressive { seed: None }).unwrap();
        assert_ne!(a.frames[3].members, chronological.frames[3].members);
    }

    #[test]
    fn test_progressive_frames_are_nested() {
        let plan = plan_frames(&half_year_spec(), &CompositeMode::Progressive { seed: Some(7) }).unwrap();
        for pair in plan.frames.windows(2) {
            assert!(pair[0].members.iter().all(|t| pair[1].members.contains(t)));
            assert!(pair[1].members.windows(2).all(|w| w[0] < w[1]));
        }
        assert_eq!(plan.frames.last().unwrap().members, plan.timepoints);

        let first = plan.frames[0].members[0];
        assert_eq!(plan.frames_for(&first).len(), plan.frames.len());
    }

    #[test]
    fn test_progressive_mode_from_config() {
        let shuffled: CompositeMode = serde_json::from_str(r#"{"mode": "progressive"}"#).unwrap();
        assert_eq!(shuffled, CompositeMode::Progressive { seed: Some(42) });

        let ordered: CompositeMode = serde_json::from_str(r#"{"mode": "progressive", "seed": null}"#).unwrap();
        assert_eq!(ordered, CompositeMode::Progressive { seed: None });
    }

    #[test]
    fn test_frames_for_time_point() {
        let spec = noon_spec(DaySelection::OddDays { months: vec![1] }, YearRange::new(2019, 2019));
        let mode = CompositeMode::SeasonalCycle {
            window: 2,
            stride: StridePolicy::Fixed(1),
        };
        let plan = plan_frames(&spec, &mode).unwrap();
        let jan_3 = TimePoint::new(2019, 1, 3, 17, 0).unwrap();
        // Windows starting at Jan 1 and Jan 3 both include Jan 3
        assert_eq!(plan.frames_for(&jan_3), vec![0, 1]);
    }

    #[test]
    fn test_stride_policy() {
        assert_eq!(StridePolicy::TargetFrames(40).stride(10), 1);
        assert_eq!(StridePolicy::TargetFrames(40).stride(186), 4);
        assert_eq!(StridePolicy::Fixed(0).stride(186), 1);
    }

    #[test]
    fn test_label_display() {
        let label = FrameLabel::DayWindow {
            index: 0,
            start_month: 12,
            start_day: 31,
            end_month: 1,
            end_day: 9,
        };
        assert_eq!(label.to_string(), "12-31..01-09");
        assert_eq!(FrameLabel::TimeOfDay { hour: 5, minute: 30 }.to_string(), "05:30Z");
    }
}
