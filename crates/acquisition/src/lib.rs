//! Scene acquisition from the NOAA GOES archive.
//!
//! The archive client finds and downloads a scene file, the decoder turns it
//! into a native-resolution raster, and the worker wraps single attempts
//! with retry and per-attempt scratch directories. Attempts can run in
//! process or in an isolated child process.

pub mod archive;
pub mod decode;
pub mod error;
pub mod fetcher;
pub mod worker;

pub use archive::{ArchiveClient, ArchiveFile, NoaaArchive, NoaaArchiveConfig};
pub use decode::{CmiDecoder, SceneDecoder};
pub use error::{ArchiveError, FetchFailure};
pub use fetcher::{run_fetch_scene, FetchOutcome, FetchedScene, InProcessFetcher, SceneFetcher, SubprocessFetcher};
pub use worker::{AcquisitionWorker, RetryPolicy};
