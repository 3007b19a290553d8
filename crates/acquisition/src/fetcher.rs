//! Single fetch attempts: resolve, download and decode one scene.
//!
//! Two implementations share the [`SceneFetcher`] seam:
//! - [`InProcessFetcher`] runs the archive client and decoder directly.
//! - [`SubprocessFetcher`] runs the same steps in a child process (the
//!   `fetch-scene` subcommand) so a crash or leak in the decoding stack
//!   cannot take down or bloat the pipeline. The child writes the raster
//!   in the cache-entry format and prints one JSON [`FetchOutcome`] line.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use goes_common::{Raster, SceneRequest};
use serde::{Deserialize, Serialize};
use storage::{decode_entry, encode_entry, CacheEntryMeta};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::archive::ArchiveClient;
use crate::decode::SceneDecoder;
use crate::error::FetchFailure;

/// A scene fetched at native resolution.
#[derive(Debug, Clone)]
pub struct FetchedScene {
    pub raster: Raster,
    /// Archive object the raster came from.
    pub source_id: Option<String>,
}

/// One attempt at fetching a scene. Retries live in the worker.
#[async_trait]
pub trait SceneFetcher: Send + Sync {
    /// Fetch `request` at native resolution, using `scratch` for any files.
    async fn fetch_once(&self, request: &SceneRequest, scratch: &Path) -> Result<FetchedScene, FetchFailure>;
}

/// Fetches in the calling process.
pub struct InProcessFetcher {
    archive: Arc<dyn ArchiveClient>,
    decoder: Arc<dyn SceneDecoder>,
}

impl InProcessFetcher {
    pub fn new(archive: Arc<dyn ArchiveClient>, decoder: Arc<dyn SceneDecoder>) -> Self {
        Self { archive, decoder }
    }
}

#[async_trait]
impl SceneFetcher for InProcessFetcher {
    #[instrument(skip(self, scratch), fields(request = %request))]
    async fn fetch_once(&self, request: &SceneRequest, scratch: &Path) -> Result<FetchedScene, FetchFailure> {
        let native = request.native();
        let file = self.archive.resolve_and_download(&native, scratch).await?;

        let decoder = self.decoder.clone();
        let path = file.path.clone();
        let raster = tokio::task::spawn_blocking(move || decoder.decode(&path, &native))
            .await
            .map_err(|e| FetchFailure::DownloadError(format!("decode task failed: {}", e)))??;

        Ok(FetchedScene {
            raster,
            source_id: Some(file.source_id),
        })
    }
}

/// Result line printed by the `fetch-scene` child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchOutcome {
    /// The raster was written to the output path.
    Ok { source_id: Option<String> },
    Failed { failure: FetchFailure },
}

impl FetchOutcome {
    pub fn to_line(&self) -> String {
        // Both variants are plain data; serialization cannot fail
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"status":"failed","failure":{{"kind":"download_error","message":"{}"}}}}"#,
                e
            )
        })
    }
}

/// Child-side body of `fetch-scene`: fetch in process and write the raster.
pub async fn run_fetch_scene(
    fetcher: &InProcessFetcher,
    request: &SceneRequest,
    output: &Path,
    scratch: &Path,
) -> FetchOutcome {
    let scene = match fetcher.fetch_once(request, scratch).await {
        Ok(scene) => scene,
        Err(failure) => return FetchOutcome::Failed { failure },
    };

    let meta = CacheEntryMeta::new(
        request.native().cache_key(),
        scene.raster.shape(),
        scene.source_id.clone(),
    );
    let written = match encode_entry(&meta, &scene.raster) {
        Ok(bytes) => tokio::fs::write(output, &bytes).await.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    match written {
        Ok(()) => FetchOutcome::Ok {
            source_id: scene.source_id,
        },
        Err(e) => FetchOutcome::Failed {
            failure: FetchFailure::DownloadError(format!("failed to write {}: {}", output.display(), e)),
        },
    }
}

/// Fetches by spawning a child process per attempt.
#[derive(Debug, Clone)]
pub struct SubprocessFetcher {
    program: PathBuf,
    base_args: Vec<String>,
    extra_args: Vec<String>,
    timeout: Option<Duration>,
}

impl SubprocessFetcher {
    /// `program base_args.. extra_args.. --request <json> --output <file> --scratch-dir <dir>`
    pub fn new(program: impl Into<PathBuf>, base_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            base_args,
            extra_args: Vec::new(),
            timeout: None,
        }
    }

    /// Re-invoke the current executable's `fetch-scene` subcommand.
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, vec!["fetch-scene".to_string()]))
    }

    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn command(&self, request_json: &str, output: &Path, scratch: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.base_args)
            .args(&self.extra_args)
            .arg("--request")
            .arg(request_json)
            .arg("--output")
            .arg(output)
            .arg("--scratch-dir")
            .arg(scratch)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            // Child logs go straight to our stderr
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl SceneFetcher for SubprocessFetcher {
    #[instrument(skip(self, scratch), fields(request = %request))]
    async fn fetch_once(&self, request: &SceneRequest, scratch: &Path) -> Result<FetchedScene, FetchFailure> {
        let request_json = serde_json::to_string(request)
            .map_err(|e| FetchFailure::DownloadError(format!("cannot encode request: {}", e)))?;
        let output_path = scratch.join("scene.grst");

        let child = self
            .command(&request_json, &output_path, scratch)
            .spawn()
            .map_err(|e| {
                FetchFailure::DownloadError(format!("failed to spawn {}: {}", self.program.display(), e))
            })?;

        let waited = child.wait_with_output();
        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, waited).await {
                Ok(result) => result,
                // Dropping the future drops the child, which kills it
                Err(_) => {
                    return Err(FetchFailure::DownloadError(format!(
                        "fetch child timed out after {}s",
                        limit.as_secs()
                    )))
                }
            },
            None => waited.await,
        }
        .map_err(|e| FetchFailure::DownloadError(format!("failed waiting for fetch child: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let outcome = parse_outcome(&stdout);
        debug!(status = ?output.status, "Fetch child exited");

        match outcome {
            Some(FetchOutcome::Ok { source_id }) if output.status.success() => {
                let bytes = tokio::fs::read(&output_path).await.map_err(|e| {
                    FetchFailure::DownloadError(format!("child output missing: {}", e))
                })?;
                let entry = decode_entry(&bytes)
                    .map_err(|e| FetchFailure::DownloadError(format!("child output unreadable: {}", e)))?;
                Ok(FetchedScene {
                    raster: entry.raster,
                    source_id,
                })
            }
            Some(FetchOutcome::Failed { failure }) => Err(failure),
            _ => {
                warn!(status = ?output.status, "Fetch child exited abnormally");
                Err(FetchFailure::DownloadError(format!(
                    "fetch child exited with {} without a result",
                    output.status
                )))
            }
        }
    }
}

/// Last parseable outcome line on the child's stdout.
fn parse_outcome(stdout: &str) -> Option<FetchOutcome> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .find_map(|line| serde_json::from_str(line).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveFile;
    use crate::error::ArchiveError;
    use goes_common::{GeometryTable, PipelineResult};
    use test_utils::{create_random_raster, sample_request};

    struct StaticArchive(Result<(), ArchiveError>);

    #[async_trait]
    impl ArchiveClient for StaticArchive {
        async fn resolve_and_download(
            &self,
            _request: &SceneRequest,
            dest_dir: &Path,
        ) -> Result<ArchiveFile, ArchiveError> {
            self.0.clone()?;
            let path = dest_dir.join("scene.nc");
            tokio::fs::write(&path, b"stub").await.unwrap();
            Ok(ArchiveFile {
                path,
                source_id: "OR_ABI-L2-CMIPF-M6C13_G16_s20190601700211_e1_c1.nc".to_string(),
            })
        }
    }

    /// Decoder returning a fixed raster, checking the request is native.
    struct FixedDecoder(GeometryTable);

    impl SceneDecoder for FixedDecoder {
        fn decode(&self, path: &Path, request: &SceneRequest) -> PipelineResult<Raster> {
            assert!(path.exists());
            assert_eq!(request.coarsen.get(), 1);
            let shape = self.0.native_shape(request);
            Ok(create_random_raster(shape.height, shape.width, 9, 0.1))
        }
    }

    fn fetcher(archive: StaticArchive) -> InProcessFetcher {
        InProcessFetcher::new(Arc::new(archive), Arc::new(FixedDecoder(GeometryTable::fixed(8, 8))))
    }

    #[tokio::test]
    async fn test_in_process_fetch() {
        let scratch = tempfile::tempdir().unwrap();
        let scene = fetcher(StaticArchive(Ok(())))
            .fetch_once(&sample_request(), scratch.path())
            .await
            .unwrap();
        assert_eq!((scene.raster.height(), scene.raster.width()), (8, 8));
        assert!(scene.source_id.unwrap().starts_with("OR_ABI-L2-CMIPF"));
    }

    #[tokio::test]
    async fn test_archive_not_found_maps_to_scene_not_found() {
        let scratch = tempfile::tempdir().unwrap();
        let err = fetcher(StaticArchive(Err(ArchiveError::NotFound("gone".into()))))
            .fetch_once(&sample_request(), scratch.path())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_child_body_writes_cache_entry() {
        let scratch = tempfile::tempdir().unwrap();
        let output = scratch.path().join("scene.grst");
        let outcome = run_fetch_scene(
            &fetcher(StaticArchive(Ok(()))),
            &sample_request(),
            &output,
            scratch.path(),
        )
        .await;

        assert!(matches!(outcome, FetchOutcome::Ok { source_id: Some(_) }));
        let entry = decode_entry(&std::fs::read(&output).unwrap()).unwrap();
        assert_eq!(entry.meta.key, sample_request().native().cache_key());
        assert_eq!((entry.raster.height(), entry.raster.width()), (8, 8));
    }

    #[tokio::test]
    async fn test_child_body_reports_failure() {
        let scratch = tempfile::tempdir().unwrap();
        let outcome = run_fetch_scene(
            &fetcher(StaticArchive(Err(ArchiveError::Network("reset".into())))),
            &sample_request(),
            &scratch.path().join("scene.grst"),
            scratch.path(),
        )
        .await;
        assert_eq!(
            outcome,
            FetchOutcome::Failed {
                failure: FetchFailure::DownloadError("reset".into())
            }
        );
    }

    #[test]
    fn test_outcome_line_format() {
        let line = FetchOutcome::Failed {
            failure: FetchFailure::CorruptData("bad header".into()),
        }
        .to_line();
        assert_eq!(
            line,
            r#"{"status":"failed","failure":{"kind":"corrupt_data","message":"bad header"}}"#
        );
        assert_eq!(
            parse_outcome(&format!("noise\n{}\n\n", line)),
            Some(FetchOutcome::Failed {
                failure: FetchFailure::CorruptData("bad header".into())
            })
        );
        assert_eq!(parse_outcome("panicked at src/main.rs"), None);
    }

    #[tokio::test]
    async fn test_missing_program_is_download_error() {
        let scratch = tempfile::tempdir().unwrap();
        let fetcher = SubprocessFetcher::new("/nonexistent/goes-compositor", vec!["fetch-scene".into()]);
        let err = fetcher.fetch_once(&sample_request(), scratch.path()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_child_without_result_is_download_error() {
        let scratch = tempfile::tempdir().unwrap();
        // `sh -c 'exit 3' --request ...` ignores the arguments and fails
        let fetcher = SubprocessFetcher::new("sh", vec!["-c".into(), "exit 3".into()]);
        let err = fetcher.fetch_once(&sample_request(), scratch.path()).await.unwrap_err();
        assert_eq!(err.kind(), "download_error");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_child_failure_line_is_propagated() {
        let scratch = tempfile::tempdir().unwrap();
        let script = r#"echo '{"status":"failed","failure":{"kind":"scene_not_found","message":"no scan"}}'"#;
        let fetcher = SubprocessFetcher::new("sh", vec!["-c".into(), script.into()]);
        let err = fetcher.fetch_once(&sample_request(), scratch.path()).await.unwrap_err();
        assert_eq!(err, FetchFailure::SceneNotFound("no scan".into()));
    }
}
