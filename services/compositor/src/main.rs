//! GOES composite builder.
//!
//! `run` executes a composite run described by a YAML config and writes the
//! frame sequence, its manifest and a run report to the output directory.
//! `fetch-scene` is the isolated per-scene worker the pipeline spawns; it
//! prints exactly one JSON outcome line on stdout and logs to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use acquisition::{
    run_fetch_scene, AcquisitionWorker, CmiDecoder, FetchFailure, FetchOutcome, InProcessFetcher, NoaaArchive,
    NoaaArchiveConfig, SceneFetcher, SubprocessFetcher,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use compositor::{
    load_config, CompositorConfig, ConfigOverrides, DirectoryFrameSink, FrameSink, FrameStatus, IsolationMode, Pipeline,
};
use goes_common::{GeometryTable, Satellite, SceneRequest};
use storage::{BlobStore, BlobStoreConfig, SceneCache};
use tracing::{error, info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "goes-compositor")]
#[command(about = "Multi-year GOES ABI composites with a persistent scene cache")]
struct Args {
    /// Log level
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "json")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a composite sequence
    Run(RunArgs),

    /// Fetch and decode one scene (spawned by `run`)
    #[command(hide = true)]
    FetchScene(FetchSceneArgs),
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Configuration file path
    #[arg(short, long, env = "GOES_COMPOSITOR_CONFIG", default_value = "config/average_day.yaml")]
    config: PathBuf,

    /// Satellite (east or west)
    #[arg(long)]
    satellite: Option<Satellite>,

    /// ABI band number (1-16)
    #[arg(long)]
    channel: Option<u8>,

    /// Coarsening factor (1, 2, 4 or 8)
    #[arg(long)]
    coarsen: Option<u32>,

    /// First year of the composite
    #[arg(long)]
    start_year: Option<i32>,

    /// Last year of the composite
    #[arg(long)]
    end_year: Option<i32>,

    /// Maximum concurrent scene fetches
    #[arg(long)]
    pool_size: Option<usize>,

    /// Scene cache directory
    #[arg(long, env = "GOES_CACHE_ROOT")]
    cache_root: Option<PathBuf>,

    /// Directory for per-fetch scratch files
    #[arg(long, env = "GOES_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Directory for frames, manifest and report
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Fetch inside this process instead of one child process per fetch
    #[arg(long)]
    in_process: bool,
}

#[derive(clap::Args, Debug)]
struct FetchSceneArgs {
    /// Configuration file (archive and geometry settings)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Scene request as JSON
    #[arg(long)]
    request: String,

    /// Where to write the decoded raster
    #[arg(long)]
    output: PathBuf,

    /// Scratch directory for the download
    #[arg(long)]
    scratch_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args.log_level, args.log_format)?;

    match args.command {
        Command::Run(run) => run_composite(run, &args.log_level, args.log_format).await,
        Command::FetchScene(fetch) => fetch_scene(fetch).await,
    }
}

fn init_tracing(log_level: &str, format: LogFormat) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout belongs to the fetch-scene outcome line
    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().with_thread_ids(true).finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }
    Ok(())
}

async fn run_composite(args: RunArgs, log_level: &str, log_format: LogFormat) -> Result<()> {
    let config_path = args
        .config
        .canonicalize()
        .with_context(|| format!("Config file {:?} not found", args.config))?;
    let mut config = load_config(&config_path)?;

    let overrides = ConfigOverrides {
        satellite: args.satellite,
        channel: args.channel,
        coarsen: args.coarsen,
        start_year: args.start_year,
        end_year: args.end_year,
        pool_size: args.pool_size,
        cache_root: args.cache_root,
        scratch_dir: args.scratch_dir,
        output_dir: args.output_dir,
        in_process: args.in_process,
    };
    config.apply_overrides(&overrides)?;
    config.validate().context("Invalid configuration")?;

    info!(
        config = %config_path.display(),
        satellite = %config.scene.satellite,
        domain = %config.scene.domain,
        channel = %config.scene.channel,
        coarsen = config.scene.coarsen.get(),
        years = ?(config.request.years.start, config.request.years.end),
        cache_root = %config.paths.cache_root.display(),
        "Starting GOES compositor"
    );

    let blobs = BlobStore::new(&BlobStoreConfig::Local {
        root: config.paths.cache_root.clone(),
    })
    .context("Failed to open scene cache")?;
    let cache = SceneCache::new(blobs, config.geometry.clone());

    let fetcher: Arc<dyn SceneFetcher> = match config.workers.isolation {
        IsolationMode::Subprocess => {
            let mut fetcher = SubprocessFetcher::current_exe()
                .context("Cannot locate own executable for fetch workers")?
                .with_extra_args(vec![
                    "--config".to_string(),
                    config_path.display().to_string(),
                    "--log-level".to_string(),
                    log_level.to_string(),
                    "--log-format".to_string(),
                    log_format.as_str().to_string(),
                ]);
            if let Some(secs) = config.workers.fetch_timeout_secs {
                fetcher = fetcher.with_timeout(Duration::from_secs(secs));
            }
            Arc::new(fetcher)
        }
        IsolationMode::InProcess => Arc::new(in_process_fetcher(config.archive.clone(), config.geometry.clone()).await?),
    };
    let worker = AcquisitionWorker::new(fetcher, config.retry.clone(), config.paths.scratch_dir.clone());

    let output_dir = config.paths.output_dir.clone();
    let pipeline = Pipeline::new(config, cache, worker);

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
    };
    let output = pipeline.run_until(shutdown).await.context("Composite run failed")?;

    tokio::fs::create_dir_all(&output_dir)
        .await
        .with_context(|| format!("Failed to create {:?}", output_dir))?;
    output
        .report
        .write_json(&output_dir.join("report.json"))
        .context("Failed to write run report")?;

    let report = &output.report;
    info!(
        complete = report.frames_with_status(FrameStatus::Complete),
        degraded = report.frames_with_status(FrameStatus::Degraded),
        empty = report.frames_with_status(FrameStatus::Empty),
        failed = report.frames_with_status(FrameStatus::Failed),
        cache_hit_rate = %format!("{:.1}%", report.cache.hit_rate()),
        "Run report written"
    );
    for frame in report.frames.iter().filter(|f| f.status != FrameStatus::Complete) {
        warn!(
            frame = %frame.name,
            status = ?frame.status,
            incorporated = frame.incorporated,
            requested = frame.requested,
            "Frame not fully sampled"
        );
    }

    let sequence = match output.sequence {
        Ok(sequence) => sequence,
        Err(e) => {
            error!(error = %e, "Frame sequence rejected");
            return Err(e).context("Composite sequence incomplete");
        }
    };
    DirectoryFrameSink::new(output_dir.join("frames"))
        .write_sequence(&sequence)
        .await
        .context("Failed to write frames")?;

    if report.interrupted {
        anyhow::bail!("Run interrupted; partial composites written");
    }
    Ok(())
}

async fn in_process_fetcher(archive: NoaaArchiveConfig, geometry: GeometryTable) -> Result<InProcessFetcher> {
    let archive = NoaaArchive::new(archive).await.context("Failed to create archive client")?;
    Ok(InProcessFetcher::new(
        Arc::new(archive),
        Arc::new(CmiDecoder::new(geometry)),
    ))
}

async fn fetch_scene(args: FetchSceneArgs) -> Result<()> {
    let (archive, geometry) = match &args.config {
        Some(path) => {
            let config: CompositorConfig = load_config(path)?;
            (config.archive, config.geometry)
        }
        None => (NoaaArchiveConfig::default(), GeometryTable::default()),
    };

    let outcome = match serde_json::from_str::<SceneRequest>(&args.request) {
        Ok(request) => {
            let fetcher = in_process_fetcher(archive, geometry).await?;
            run_fetch_scene(&fetcher, &request, &args.output, &args.scratch_dir).await
        }
        Err(e) => FetchOutcome::Failed {
            failure: FetchFailure::DownloadError(format!("unreadable request: {}", e)),
        },
    };

    if let FetchOutcome::Failed { ref failure } = outcome {
        warn!(kind = failure.kind(), error = %failure, "Scene fetch failed");
        // Leave nothing behind for the parent to mistake for a result
        remove_if_exists(&args.output).await;
    }
    println!("{}", outcome.to_line());
    Ok(())
}

async fn remove_if_exists(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove partial output");
        }
    }
}
