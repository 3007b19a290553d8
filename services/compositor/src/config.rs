//! Compositor configuration.
//!
//! Loaded from a YAML file with `${VAR}` / `${VAR:-default}` substitution,
//! then individual fields may be overridden from the command line. The
//! resulting [`CompositorConfig`] is passed explicitly into the pipeline;
//! nothing here is process-wide state.

use std::fs;
use std::path::{Path, PathBuf};

use acquisition::{NoaaArchiveConfig, RetryPolicy};
use anyhow::{Context, Result};
use composite::{CompositeMode, CompositeSpec, SequencePolicy};
use goes_common::{
    Channel, CoarsenFactor, Domain, GeometryTable, PipelineError, PipelineResult, Satellite, SceneRequest,
    TimePoint,
};
use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositorConfig {
    pub scene: SceneConfig,
    /// Years, days and times of day to sample.
    pub request: CompositeSpec,
    #[serde(default = "default_mode")]
    pub mode: CompositeMode,
    /// Fail the run unless exactly this many frames are produced.
    #[serde(default)]
    pub required_frames: Option<usize>,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub archive: NoaaArchiveConfig,
    #[serde(default)]
    pub geometry: GeometryTable,
}

fn default_mode() -> CompositeMode {
    CompositeMode::DailyCycle
}

/// What to image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    pub satellite: Satellite,
    pub domain: Domain,
    pub channel: Channel,
    #[serde(default = "default_coarsen")]
    pub coarsen: CoarsenFactor,
}

fn default_coarsen() -> CoarsenFactor {
    CoarsenFactor::X2
}

impl SceneConfig {
    pub fn request_at(&self, time: TimePoint) -> SceneRequest {
        SceneRequest {
            satellite: self.satellite,
            domain: self.domain,
            channel: self.channel,
            coarsen: self.coarsen,
            time,
        }
    }
}

/// How fetches are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationMode {
    /// One child process per fetch attempt.
    #[default]
    Subprocess,
    /// Fetch inside the pipeline process.
    InProcess,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Upper bound on concurrent scene fetches.
    pub pool_size: usize,
    pub isolation: IsolationMode,
    /// Kill a fetch child that runs longer than this.
    pub fetch_timeout_secs: Option<u64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            isolation: IsolationMode::Subprocess,
            fetch_timeout_secs: Some(900),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub cache_root: PathBuf,
    pub scratch_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from("data/cache"),
            scratch_dir: std::env::temp_dir().join("goes-compositor"),
            output_dir: PathBuf::from("data/output"),
        }
    }
}

/// Command-line overrides; `None` keeps the file's value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub satellite: Option<Satellite>,
    pub channel: Option<u8>,
    pub coarsen: Option<u32>,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub pool_size: Option<usize>,
    pub cache_root: Option<PathBuf>,
    pub scratch_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub in_process: bool,
}

impl CompositorConfig {
    /// Apply overrides. Out-of-range channel or coarsening values are
    /// rejected here rather than clamped.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) -> PipelineResult<()> {
        if let Some(satellite) = overrides.satellite {
            self.scene.satellite = satellite;
        }
        if let Some(band) = overrides.channel {
            self.scene.channel = Channel::new(band)?;
        }
        if let Some(factor) = overrides.coarsen {
            self.scene.coarsen = CoarsenFactor::try_from(factor)?;
        }
        if let Some(start) = overrides.start_year {
            self.request.years.start = start;
        }
        if let Some(end) = overrides.end_year {
            self.request.years.end = end;
        }
        if let Some(pool_size) = overrides.pool_size {
            self.workers.pool_size = pool_size;
        }
        if let Some(ref path) = overrides.cache_root {
            self.paths.cache_root = path.clone();
        }
        if let Some(ref path) = overrides.scratch_dir {
            self.paths.scratch_dir = path.clone();
        }
        if let Some(ref path) = overrides.output_dir {
            self.paths.output_dir = path.clone();
        }
        if overrides.in_process {
            self.workers.isolation = IsolationMode::InProcess;
        }
        Ok(())
    }

    /// Reject configurations that cannot produce a run.
    pub fn validate(&self) -> PipelineResult<()> {
        self.request.validate()?;

        if self.workers.pool_size == 0 {
            return Err(PipelineError::invalid_spec("workers.pool_size must be at least 1"));
        }
        if self.required_frames == Some(0) {
            return Err(PipelineError::invalid_spec("required_frames must be at least 1"));
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err(PipelineError::invalid_spec(format!(
                "retry.max_delay_ms ({}) is below retry.initial_delay_ms ({})",
                self.retry.max_delay_ms, self.retry.initial_delay_ms
            )));
        }
        if let CompositeMode::SeasonalCycle { window: 0, .. } = self.mode {
            return Err(PipelineError::invalid_spec("seasonal window must be at least 1"));
        }
        if let GeometryTable::Fixed { height, width } = self.geometry {
            if height == 0 || width == 0 {
                return Err(PipelineError::invalid_spec("fixed geometry must be non-empty"));
            }
        }
        for (name, path) in [
            ("cache_root", &self.paths.cache_root),
            ("scratch_dir", &self.paths.scratch_dir),
            ("output_dir", &self.paths.output_dir),
        ] {
            if path.as_os_str().is_empty() {
                return Err(PipelineError::invalid_spec(format!("paths.{} cannot be empty", name)));
            }
        }
        Ok(())
    }

    pub fn sequence_policy(&self) -> SequencePolicy {
        match self.required_frames {
            Some(n) => SequencePolicy::Exact(n),
            None => SequencePolicy::BestEffort,
        }
    }
}

/// Load a configuration file with environment variable substitution.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CompositorConfig> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config from {:?}", path.as_ref()))?;

    let expanded = expand_env_vars(&content)?;

    serde_yaml::from_str(&expanded).with_context(|| format!("Failed to parse config from {:?}", path.as_ref()))
}

/// Expand `${VAR}` and `${VAR:-default}` in YAML content.
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'

            let mut var_expr = String::new();
            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(c) => var_expr.push(c),
                    None => anyhow::bail!("Unclosed variable substitution: ${{{}", var_expr),
                }
            }

            result.push_str(&resolve_var_expr(&var_expr)?);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

fn resolve_var_expr(expr: &str) -> Result<String> {
    if let Some((var_name, default)) = expr.split_once(":-") {
        match std::env::var(var_name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        }
    } else {
        std::env::var(expr.trim()).with_context(|| format!("Environment variable {} not set", expr))
    }
}
