//! Ordering of finalized composites into the sequence handed to rendering.

use std::collections::BTreeMap;

use goes_common::{PipelineError, PipelineResult, Raster};
use tracing::warn;

use crate::accumulate::CompositeAccumulator;
use crate::plan::FrameLabel;

/// A finalized composite. Immutable once built.
#[derive(Debug, Clone)]
pub struct CompositeFrame {
    pub label: FrameLabel,
    pub raster: Raster,
    /// Rasters merged into this frame.
    pub samples: usize,
    pub min_pixel_samples: u32,
    pub max_pixel_samples: u32,
}

impl CompositeFrame {
    pub fn from_accumulator(label: FrameLabel, acc: &CompositeAccumulator) -> Self {
        let (min_pixel_samples, max_pixel_samples) = acc.count_range();
        Self {
            label,
            raster: acc.finalize(),
            samples: acc.merged(),
            min_pixel_samples,
            max_pixel_samples,
        }
    }
}

/// One position of the assembled sequence.
#[derive(Debug, Clone)]
pub enum SequenceSlot {
    Present(CompositeFrame),
    /// A planned frame that produced no composite.
    Missing(FrameLabel),
}

impl SequenceSlot {
    pub fn label(&self) -> FrameLabel {
        match self {
            SequenceSlot::Present(frame) => frame.label,
            SequenceSlot::Missing(label) => *label,
        }
    }

    pub fn frame(&self) -> Option<&CompositeFrame> {
        match self {
            SequenceSlot::Present(frame) => Some(frame),
            SequenceSlot::Missing(_) => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, SequenceSlot::Missing(_))
    }
}

/// How strictly the assembler treats absent frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencePolicy {
    /// At least this many distinct frames must be present.
    Exact(usize),
    /// Pass gaps through as missing slots.
    BestEffort,
}

#[derive(Debug, Clone)]
pub struct SequenceAssembler {
    expected: Vec<FrameLabel>,
    policy: SequencePolicy,
}

impl SequenceAssembler {
    /// `expected` lists every label the plan produced; absent ones become
    /// [`SequenceSlot::Missing`].
    pub fn new(expected: Vec<FrameLabel>, policy: SequencePolicy) -> Self {
        Self { expected, policy }
    }

    pub fn policy(&self) -> SequencePolicy {
        self.policy
    }

    /// Order frames by label, keeping the first frame seen for a repeated label.
    pub fn assemble(&self, frames: Vec<CompositeFrame>) -> PipelineResult<Vec<SequenceSlot>> {
        let mut by_label: BTreeMap<FrameLabel, Option<CompositeFrame>> =
            self.expected.iter().map(|label| (*label, None)).collect();

        let mut present = 0;
        for frame in frames {
            let entry = by_label.entry(frame.label).or_insert(None);
            if entry.is_some() {
                warn!(label = %frame.label, "Duplicate composite frame dropped");
                continue;
            }
            *entry = Some(frame);
            present += 1;
        }

        if let SequencePolicy::Exact(required) = self.policy {
            if present < required {
                return Err(PipelineError::IncompleteSequence {
                    required,
                    produced: present,
                });
            }
        }

        Ok(by_label
            .into_iter()
            .map(|(label, frame)| match frame {
                Some(frame) => SequenceSlot::Present(frame),
                None => SequenceSlot::Missing(label),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goes_common::RasterShape;

    fn hour(h: u32) -> FrameLabel {
        FrameLabel::TimeOfDay { hour: h, minute: 0 }
    }

    fn frame(h: u32, value: f32) -> CompositeFrame {
        CompositeFrame {
            label: hour(h),
            raster: Raster::filled(RasterShape::new(1, 1), value),
            samples: 1,
            min_pixel_samples: 1,
            max_pixel_samples: 1,
        }
    }

    #[test]
    fn test_orders_by_label() {
        let assembler = SequenceAssembler::new(vec![], SequencePolicy::BestEffort);
        let slots = assembler
            .assemble(vec![frame(5, 0.0), frame(1, 0.0), frame(3, 0.0)])
            .unwrap();
        let labels: Vec<_> = slots.iter().map(|s| s.label()).collect();
        assert_eq!(labels, vec![hour(1), hour(3), hour(5)]);
    }

    #[test]
    fn test_gaps_are_marked_missing() {
        let expected = (0..4).map(hour).collect();
        let assembler = SequenceAssembler::new(expected, SequencePolicy::BestEffort);
        let slots = assembler.assemble(vec![frame(0, 1.0), frame(3, 1.0)]).unwrap();

        assert_eq!(slots.len(), 4);
        assert!(!slots[0].is_missing());
        assert!(slots[1].is_missing());
        assert!(slots[2].is_missing());
        assert_eq!(slots[3].label(), hour(3));
    }

    #[test]
    fn test_exact_count_fails_when_short() {
        let expected = (0..24).map(hour).collect();
        let assembler = SequenceAssembler::new(expected, SequencePolicy::Exact(24));
        let frames = (0..23).map(|h| frame(h, 1.0)).collect();

        match assembler.assemble(frames) {
            Err(PipelineError::IncompleteSequence { required, produced }) => {
                assert_eq!(required, 24);
                assert_eq!(produced, 23);
            }
            other => panic!("expected IncompleteSequence, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_labels_keep_first() {
        let assembler = SequenceAssembler::new(vec![hour(2)], SequencePolicy::Exact(1));
        let slots = assembler.assemble(vec![frame(2, 7.0), frame(2, 9.0)]).unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].frame().unwrap().raster.data()[0], 7.0);
    }

    #[test]
    fn test_frame_from_accumulator() {
        let mut acc = CompositeAccumulator::new(RasterShape::new(1, 2));
        acc.accumulate(&Raster::new(RasterShape::new(1, 2), vec![1.0, f32::NAN]).unwrap())
            .unwrap();
        acc.accumulate(&Raster::new(RasterShape::new(1, 2), vec![3.0, 4.0]).unwrap())
            .unwrap();

        let frame = CompositeFrame::from_accumulator(FrameLabel::Climatology, &acc);
        assert_eq!(frame.samples, 2);
        assert_eq!(frame.min_pixel_samples, 1);
        assert_eq!(frame.max_pixel_samples, 2);
        assert_eq!(frame.raster.data(), &[2.0, 4.0]);
    }
}
