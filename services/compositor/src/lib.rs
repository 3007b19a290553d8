//! Multi-year GOES composite pipeline.
//!
//! Wires the scene cache, the acquisition worker and the compositing
//! crates into a run: enumerate, look up or fetch, coarsen, cache,
//! accumulate, assemble, and hand frames to a sink.

pub mod config;
pub mod pipeline;
pub mod report;
pub mod sink;

pub use config::{load_config, CompositorConfig, ConfigOverrides, IsolationMode, PathsConfig, SceneConfig, WorkerConfig};
pub use pipeline::{Pipeline, RunOutput};
pub use report::{FrameReport, FrameStatus, RunReport, SkippedSample};
pub use sink::{DirectoryFrameSink, FrameManifest, FrameSink, ManifestEntry};
