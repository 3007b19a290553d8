//! The composite pipeline.
//!
//! For every unique time point of the plan: look the scene up in the cache,
//! fetch it on a miss, coarsen it, cache it, and merge it into every frame
//! that includes that time point. Scenes are processed by a bounded pool of
//! concurrent tasks; per-scene failures are recorded and skipped.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use acquisition::{AcquisitionWorker, FetchFailure};
use composite::{
    coarsen, plan_frames, CompositeFrame, FramePlan, SequenceAssembler, SequenceSlot, SharedAccumulator,
};
use futures::{future, StreamExt};
use goes_common::{PipelineError, PipelineResult, Raster, TimePoint};
use metrics::counter;
use storage::SceneCache;
use tracing::{debug, info, instrument, warn};

use crate::config::CompositorConfig;
use crate::report::{ReportBuilder, RunReport, SkippedSample};

/// Everything a run produced.
#[derive(Debug)]
pub struct RunOutput {
    pub report: RunReport,
    /// The ordered frames, or `IncompleteSequence` when a required frame
    /// count was not met. The report is valid either way.
    pub sequence: PipelineResult<Vec<SequenceSlot>>,
}

/// What happened to one time point.
enum SampleOutcome {
    Incorporated { from_cache: bool },
    Skipped(FetchFailure),
    /// The raster contradicts the geometry table; its frames are abandoned.
    Rejected(PipelineError),
}

pub struct Pipeline {
    config: CompositorConfig,
    cache: SceneCache,
    worker: AcquisitionWorker,
}

impl Pipeline {
    pub fn new(config: CompositorConfig, cache: SceneCache, worker: AcquisitionWorker) -> Self {
        Self { config, cache, worker }
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    pub fn cache(&self) -> &SceneCache {
        &self.cache
    }

    /// Run to completion.
    pub async fn run(&self) -> PipelineResult<RunOutput> {
        self.run_until(future::pending::<()>()).await
    }

    /// Run until done or until `shutdown` resolves.
    ///
    /// On shutdown, in-flight fetches are dropped (killing their child
    /// processes and removing their scratch directories) and the frames are
    /// finalized from whatever was merged so far.
    #[instrument(skip_all, fields(satellite = %self.config.scene.satellite, channel = %self.config.scene.channel))]
    pub async fn run_until<F>(&self, shutdown: F) -> PipelineResult<RunOutput>
    where
        F: Future<Output = ()> + Send,
    {
        self.config.validate()?;
        let plan = Arc::new(plan_frames(&self.config.request, &self.config.mode)?);
        info!(
            frames = plan.frames.len(),
            scenes = plan.timepoints.len(),
            pool_size = self.config.workers.pool_size,
            "Starting composite run"
        );

        let first = plan
            .timepoints
            .first()
            .copied()
            .ok_or_else(|| PipelineError::invalid_spec("request selects no time points"))?;
        let template = self.config.scene.request_at(first);
        let shape = self.cache.geometry().expected_shape(&template);
        let accumulators: Arc<Vec<SharedAccumulator>> = Arc::new(
            plan.frames
                .iter()
                .map(|_| SharedAccumulator::with_shape(shape))
                .collect(),
        );

        let mut report = ReportBuilder::new(&plan);
        let mut pending: BTreeSet<TimePoint> = plan.timepoints.iter().copied().collect();

        let mut outcomes = Box::pin(
            futures::stream::iter(plan.timepoints.clone())
                .map(|time| {
                    let plan = plan.clone();
                    let accumulators = accumulators.clone();
                    async move {
                        let outcome = self.process(time, &plan, &accumulators).await;
                        (time, outcome)
                    }
                })
                .buffer_unordered(self.config.workers.pool_size)
                .take_until(shutdown),
        );

        while let Some((time, outcome)) = outcomes.next().await {
            pending.remove(&time);
            let frames = plan.frames_for(&time);
            match outcome {
                SampleOutcome::Incorporated { from_cache } => {
                    report.incorporated(&frames, from_cache);
                }
                SampleOutcome::Skipped(failure) => {
                    report.skipped(
                        &frames,
                        SkippedSample {
                            time,
                            reason: failure.kind().to_string(),
                            message: failure.message().to_string(),
                        },
                    );
                }
                SampleOutcome::Rejected(err) => {
                    warn!(time = %time, error = %err, "Abandoning composites for inconsistent scene");
                    report.skipped(
                        &frames,
                        SkippedSample {
                            time,
                            reason: "shape_mismatch".to_string(),
                            message: err.to_string(),
                        },
                    );
                    report.failed(&frames, &err.to_string());
                }
            }
        }
        // Abandon anything still in flight
        drop(outcomes);

        if !pending.is_empty() {
            warn!(remaining = pending.len(), "Run interrupted before all scenes were processed");
            report.interrupted();
            for time in pending {
                report.skipped(
                    &plan.frames_for(&time),
                    SkippedSample {
                        time,
                        reason: "interrupted".to_string(),
                        message: "run stopped before this scene was processed".to_string(),
                    },
                );
            }
        }

        let frames: Vec<CompositeFrame> = plan
            .frames
            .iter()
            .zip(accumulators.iter())
            .enumerate()
            .filter(|(i, _)| !report.is_failed(*i))
            .filter_map(|(_, (planned, shared))| {
                let acc = shared.take()?;
                (acc.merged() > 0).then(|| CompositeFrame::from_accumulator(planned.label, &acc))
            })
            .collect();

        let report = report.finish(self.cache.stats());
        info!(
            produced = frames.len(),
            planned = plan.frames.len(),
            skipped = report.scenes_skipped,
            fetched = report.scenes_fetched,
            from_cache = report.scenes_from_cache,
            "Composite run finished"
        );

        let assembler = SequenceAssembler::new(plan.labels(), self.config.sequence_policy());
        let sequence = assembler.assemble(frames);
        Ok(RunOutput { report, sequence })
    }

    async fn process(&self, time: TimePoint, plan: &FramePlan, accumulators: &[SharedAccumulator]) -> SampleOutcome {
        let request = self.config.scene.request_at(time);

        let (raster, from_cache) = match self.cache.lookup(&request).await {
            Some(entry) => (entry.raster, true),
            None => match self.fetch_and_cache(time).await {
                Ok(raster) => (raster, false),
                Err(outcome) => return outcome,
            },
        };

        let targets: Vec<SharedAccumulator> = plan
            .frames_for(&time)
            .into_iter()
            .filter_map(|i| accumulators.get(i).cloned())
            .collect();
        let merged = tokio::task::spawn_blocking(move || -> PipelineResult<()> {
            for acc in &targets {
                acc.accumulate(&raster)?;
            }
            Ok(())
        })
        .await
        .map_err(|e| PipelineError::Internal(format!("accumulate task failed: {}", e)))
        .and_then(|r| r);

        match merged {
            Ok(()) => {
                counter!("goes_scenes_incorporated_total").increment(1);
                debug!(time = %time, from_cache, "Scene incorporated");
                SampleOutcome::Incorporated { from_cache }
            }
            Err(err) => SampleOutcome::Rejected(err),
        }
    }

    /// Fetch, check and coarsen a scene, then cache it. A failed cache write
    /// only costs a warning; the raster is used regardless.
    async fn fetch_and_cache(&self, time: TimePoint) -> Result<Raster, SampleOutcome> {
        let request = self.config.scene.request_at(time);

        let scene = self.worker.fetch(&request.native()).await.map_err(SampleOutcome::Skipped)?;

        let native = self.cache.geometry().native_shape(&request);
        scene.raster.ensure_shape(native).map_err(SampleOutcome::Rejected)?;

        let factor = request.coarsen;
        let native_raster = scene.raster;
        let raster = tokio::task::spawn_blocking(move || coarsen(&native_raster, factor))
            .await
            .map_err(|e| SampleOutcome::Rejected(PipelineError::Internal(format!("coarsen task failed: {}", e))))?;

        if let Err(e) = self.cache.store(&request, &raster, scene.source_id).await {
            let err: PipelineError = e.into();
            warn!(time = %time, error = %err, "Continuing without caching scene");
        }
        Ok(raster)
    }
}
