//! Common types shared across the GOES climatology crates.

pub mod error;
pub mod geometry;
pub mod raster;
pub mod scene;
pub mod time;

pub use error::{PipelineError, PipelineResult};
pub use geometry::GeometryTable;
pub use raster::{Raster, RasterShape};
pub use scene::{Channel, CoarsenFactor, Domain, Satellite, SceneRequest};
pub use time::{TimeOfDay, TimePoint};
