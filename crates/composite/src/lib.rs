//! Temporal compositing of GOES ABI rasters.
//!
//! This crate turns a composite request into time points
//! ([`enumerate`]), groups them into frames ([`plan`]), reduces scene
//! resolution ([`coarsen`]), averages rasters while ignoring missing pixels
//! ([`accumulate`]) and orders the finished frames ([`sequence`]).

pub mod accumulate;
pub mod coarsen;
pub mod enumerate;
pub mod plan;
pub mod sequence;

pub use accumulate::{CompositeAccumulator, SharedAccumulator};
pub use coarsen::{coarsen, coarsen_by};
pub use enumerate::{CompositeSpec, DaySelection, TimesOfDay, YearRange};
pub use plan::{plan_frames, CompositeMode, FrameLabel, FramePlan, PlannedFrame, StridePolicy};
pub use sequence::{CompositeFrame, SequenceAssembler, SequencePolicy, SequenceSlot};
