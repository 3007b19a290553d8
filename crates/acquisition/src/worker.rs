//! Acquisition worker: fetch attempts with retry and scratch isolation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use goes_common::SceneRequest;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::FetchFailure;
use crate::fetcher::{FetchedScene, SceneFetcher};

/// Retry settings for transient download failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Initial retry delay (doubles each retry).
    pub initial_delay_ms: u64,
    /// Maximum retry delay.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 2_000,
            max_delay_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Exponential backoff step, capped at `max_delay`.
    pub fn next_delay(&self, delay: Duration) -> Duration {
        delay.saturating_mul(2).min(self.max_delay())
    }
}

/// Fetches scenes through a [`SceneFetcher`], retrying download errors.
///
/// Every attempt gets its own scratch directory under `scratch_root`, which
/// is removed when the attempt ends whatever its outcome.
#[derive(Clone)]
pub struct AcquisitionWorker {
    fetcher: Arc<dyn SceneFetcher>,
    retry: RetryPolicy,
    scratch_root: PathBuf,
}

impl AcquisitionWorker {
    pub fn new(fetcher: Arc<dyn SceneFetcher>, retry: RetryPolicy, scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            retry,
            scratch_root: scratch_root.into(),
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Fetch one scene at native resolution.
    ///
    /// `SceneNotFound` and `CorruptData` are returned immediately;
    /// `DownloadError` is retried with exponential backoff until the policy
    /// is exhausted.
    #[instrument(skip(self), fields(request = %request))]
    pub async fn fetch(&self, request: &SceneRequest) -> Result<FetchedScene, FetchFailure> {
        let mut retry_count = 0;
        let mut delay = self.retry.initial_delay();

        loop {
            counter!("goes_fetch_attempts_total").increment(1);

            match self.attempt(request).await {
                Ok(scene) => {
                    debug!(retries = retry_count, "Scene fetched");
                    return Ok(scene);
                }
                Err(failure) if failure.is_retryable() && retry_count < self.retry.max_retries => {
                    retry_count += 1;
                    warn!(
                        error = %failure,
                        retry = retry_count,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Fetch failed, retrying"
                    );

                    // Wait before retry
                    tokio::time::sleep(delay).await;

                    delay = self.retry.next_delay(delay);
                }
                Err(failure) => {
                    counter!("goes_fetch_failures_total", "kind" => failure.kind()).increment(1);
                    info!(kind = failure.kind(), error = %failure, retries = retry_count, "Scene unavailable");
                    return Err(failure);
                }
            }
        }
    }

    async fn attempt(&self, request: &SceneRequest) -> Result<FetchedScene, FetchFailure> {
        tokio::fs::create_dir_all(&self.scratch_root).await.map_err(|e| {
            FetchFailure::DownloadError(format!(
                "cannot create scratch root {}: {}",
                self.scratch_root.display(),
                e
            ))
        })?;
        let scratch = tempfile::Builder::new()
            .prefix("fetch-")
            .tempdir_in(&self.scratch_root)
            .map_err(|e| FetchFailure::DownloadError(format!("cannot create scratch dir: {}", e)))?;

        let result = self.fetcher.fetch_once(request, scratch.path()).await;

        if let Err(e) = scratch.close() {
            warn!(error = %e, "Failed to remove scratch directory");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_delay_ms: 1_000,
            max_delay_ms: 5_000,
        };
        let mut delay = policy.initial_delay();
        let mut steps = Vec::new();
        for _ in 0..4 {
            delay = policy.next_delay(delay);
            steps.push(delay.as_millis());
        }
        assert_eq!(steps, vec![2_000, 4_000, 5_000, 5_000]);
    }

    #[test]
    fn test_backoff_saturates_on_huge_delays() {
        let policy = RetryPolicy {
            max_retries: 1,
            initial_delay_ms: u64::MAX,
            max_delay_ms: u64::MAX,
        };
        let next = policy.next_delay(policy.initial_delay());
        assert_eq!(next, policy.max_delay());
        assert_eq!(policy.next_delay(Duration::MAX), policy.max_delay());
    }
}
