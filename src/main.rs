//! BandReader - real-time text reading inside a fixed camera band
//!
//! Extracts a horizontal read region from every frame, recognizes text in it,
//! outlines the chosen line and composites the band back over a dimmed frame.

mod app;
mod capture;
mod config;
mod overlay;
mod shared;
mod storage;
mod vision;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::app::{run_source, ReadPipeline};
use crate::capture::{FrameLayout, FrameSource, ImageDirSource, RepeatSource};
use crate::config::AppConfig;
use crate::overlay::{DisplayThread, LogSink, PngSequenceSink};
use crate::vision::{NullRecognizer, RecognitionGateway, ReplayRecognizer};

/// BandReader - read text in a fixed band of a video feed
#[derive(Parser, Debug)]
#[command(name = "band-reader")]
#[command(about = "Outline and read the text line inside a fixed band of each frame")]
struct Args {
    /// Directory of frame images, read in file name order
    input: Option<PathBuf>,

    /// Use a single still image instead of a directory
    #[arg(long, conflicts_with = "input")]
    still: Option<PathBuf>,

    /// How many times to repeat the still image
    #[arg(long, default_value = "1", requires = "still")]
    repeat: u64,

    /// JSON script of recognizer results to replay
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Configuration file (defaults to the per-user config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the effective configuration and exit
    #[arg(long)]
    write_config: bool,

    /// Directory for composited PNG frames (overrides display.output_dir)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Override pipeline.dim_alpha
    #[arg(long)]
    dim_alpha: Option<f32>,

    /// Recognize frame N with the accurate level (or the next processed frame if N is dropped)
    #[arg(long = "rescan-at", value_name = "N")]
    rescan_at: Vec<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_thread_names(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting BandReader v{}", env!("CARGO_PKG_VERSION"));

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => storage::default_config_path()?,
    };
    let mut config = load_or_create_config(&config_path, args.config.is_some())?;
    if let Some(alpha) = args.dim_alpha {
        config.pipeline.dim_alpha = alpha;
    }
    if let Some(dir) = &args.output {
        config.display.output_dir = Some(dir.clone());
    }
    config.validate()?;

    if args.write_config {
        config::save_config(&config, &config_path)?;
        info!("Wrote configuration to {:?}", config_path);
        return Ok(());
    }

    let layout = FrameLayout {
        format: config.capture.pixel_format,
        origin: config.capture.origin,
        orientation: config.capture.orientation,
    };
    let mut source: Box<dyn FrameSource> = match (&args.input, &args.still) {
        (Some(dir), _) => Box::new(ImageDirSource::new(dir, layout)?),
        (None, Some(still)) => Box::new(RepeatSource::new(still, layout, args.repeat)?),
        (None, None) => anyhow::bail!("Provide a frame directory or --still <image>"),
    };

    let gateway: Arc<dyn RecognitionGateway> = match &args.replay {
        Some(path) => Arc::new(ReplayRecognizer::from_file(path)?),
        None => {
            warn!("No recognizer configured; frames will be composited without text");
            Arc::new(NullRecognizer)
        }
    };

    let display = match &config.display.output_dir {
        Some(dir) => DisplayThread::spawn(PngSequenceSink::new(dir)?)?,
        None => DisplayThread::spawn(LogSink)?,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    let stats = runtime.block_on(async {
        let pipeline = ReadPipeline::new(&config, gateway, display.sender())?;

        {
            let frames = run_source(&pipeline, source.as_mut(), config.capture.max_fps, &args.rescan_at);
            tokio::pin!(frames);
            tokio::select! {
                result = &mut frames => result?,
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    pipeline.shutdown();
                    frames.await?;
                }
            }
        }

        anyhow::Ok(pipeline.finish().await)
    })?;

    let report = display.join();
    info!(
        "Done: {} submitted, {} presented, {} dropped, {} failed, {} discarded",
        stats.submitted, stats.presented, stats.dropped, stats.failed, stats.discarded
    );
    if let Some(text) = report.last_text {
        info!("Last text: {}", text);
    }

    Ok(())
}

/// Load configuration from file or fall back to defaults
fn load_or_create_config(path: &Path, explicit: bool) -> Result<AppConfig> {
    if path.exists() {
        let config = config::load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }
    if explicit {
        warn!("Configuration file {:?} not found, using defaults", path);
    } else {
        info!("Using default configuration");
    }
    Ok(AppConfig::default())
}
