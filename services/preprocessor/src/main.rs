//! Forest-loss preprocessor.
//!
//! Turns the Hansen lossyear tile into per-resolution H3 hexagon documents:
//! - Downloads the tile once and caches it on disk
//! - Reads only the configured geographic window
//! - Aggregates weighted loss counts per cell and per year
//! - Writes `{prefix}-res{N}.json` for every configured resolution

mod config;
mod download;
mod pipeline;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use hex_aggregator::parse_resolution_list;

use config::PreprocessorConfig;

#[derive(Parser, Debug)]
#[command(name = "preprocessor")]
#[command(about = "Aggregate forest-loss lossyear rasters into H3 hexagon documents")]
struct Args {
    /// YAML configuration file (optional; built-in defaults otherwise)
    #[arg(short, long, env = "FOREST_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for the cached tile
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Directory for output documents
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Sub-sampling stride in pixels
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Comma separated H3 resolutions, e.g. "4,5,6,7"
    #[arg(long)]
    resolutions: Option<String>,

    /// Sweep rows on a single thread
    #[arg(long)]
    no_parallel: bool,

    /// Fail instead of downloading when the tile is not cached
    #[arg(long)]
    offline: bool,

    /// Write Prometheus text-format metrics to this file after the run
    #[arg(long, env = "FOREST_METRICS_FILE")]
    metrics_file: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    /// Layer command-line flags over the loaded configuration.
    fn apply(&self, config: &mut PreprocessorConfig) -> Result<()> {
        if let Some(dir) = &self.cache_dir {
            config.cache_dir = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(rate) = self.sample_rate {
            config.aggregation.sample_rate = rate;
        }
        if let Some(list) = &self.resolutions {
            config.aggregation.resolutions =
                parse_resolution_list(list).context("Invalid --resolutions")?;
        }
        if self.no_parallel {
            config.aggregation.parallel = false;
        }
        if self.offline {
            config.offline = true;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let prometheus = match &args.metrics_file {
        Some(_) => Some(
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .context("Failed to install Prometheus recorder")?,
        ),
        None => None,
    };

    let mut config = match &args.config {
        Some(path) => PreprocessorConfig::load(path)?,
        None => PreprocessorConfig::default(),
    };
    config.apply_env();
    args.apply(&mut config)?;

    info!(
        tile_url = %config.tile_url,
        cache_dir = %config.cache_dir.display(),
        output_dir = %config.output_dir.display(),
        bounds = %config.aggregation.bounds,
        sample_rate = config.aggregation.sample_rate,
        resolutions = ?config.aggregation.resolutions,
        parallel = config.aggregation.parallel,
        offline = config.offline,
        "Starting forest-loss preprocessor"
    );

    let summary = pipeline::run(&config).await?;
    summary.log();

    if let (Some(handle), Some(path)) = (prometheus, &args.metrics_file) {
        if let Err(e) = tokio::fs::write(path, handle.render()).await {
            warn!(error = %e, path = %path.display(), "Failed to write metrics file");
        }
    }

    Ok(())
}
