//! End-to-end preprocessing run.
//!
//! validate config -> fetch tile -> extract window once -> for each
//! resolution: aggregate on a blocking thread -> write document.
//!
//! Any error aborts the run. Documents already written for earlier
//! resolutions are left in place; a document is never half-written.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use metrics::{counter, gauge, histogram};
use tracing::{info, instrument};

use hex_aggregator::{
    extract_window, write_document, AggregationResult, ForestLossDocument, GeoTiffSource,
    HexAggregator, RasterWindow,
};

use crate::config::PreprocessorConfig;
use crate::download::{TileFetcher, TileOrigin};

/// Outcome of one resolution pass.
#[derive(Debug, Clone)]
pub struct ResolutionSummary {
    pub resolution: u8,
    pub cells: usize,
    pub total_loss: u64,
    pub sampled: u64,
    pub skipped: u64,
    pub path: PathBuf,
    pub elapsed: Duration,
}

/// Outcome of a full run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub tile_path: PathBuf,
    pub tile_bytes: u64,
    pub tile_from_cache: bool,
    pub window_width: usize,
    pub window_height: usize,
    pub resolutions: Vec<ResolutionSummary>,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Log the summary, one line per resolution.
    pub fn log(&self) {
        for res in &self.resolutions {
            info!(
                resolution = res.resolution,
                cells = res.cells,
                total_loss = res.total_loss,
                sampled = res.sampled,
                skipped = res.skipped,
                path = %res.path.display(),
                elapsed_ms = res.elapsed.as_millis() as u64,
                "Resolution summary"
            );
        }
        info!(
            tile = %self.tile_path.display(),
            tile_bytes = self.tile_bytes,
            from_cache = self.tile_from_cache,
            window_width = self.window_width,
            window_height = self.window_height,
            documents = self.resolutions.len(),
            elapsed_secs = self.elapsed.as_secs_f64(),
            "Preprocessing complete"
        );
    }
}

/// Run the whole pipeline.
pub async fn run(config: &PreprocessorConfig) -> Result<RunSummary> {
    let started = Instant::now();

    // Configuration errors are fatal before anything is fetched
    config.validate()?;
    let aggregator = HexAggregator::new(config.aggregation.clone())?;

    let fetcher = TileFetcher::new(config.download.clone(), &config.cache_dir, config.offline)?;
    let file_name = config.tile_file_name()?;
    let tile = fetcher
        .fetch(&config.tile_url, &file_name)
        .await
        .context("Failed to acquire lossyear tile")?;

    let window = load_window(tile.path.clone(), config).await?;

    let mut resolutions = Vec::with_capacity(config.aggregation.resolutions.len());
    for &resolution in &config.aggregation.resolutions {
        resolutions.push(process_resolution(&aggregator, &window, resolution, config).await?);
    }

    Ok(RunSummary {
        tile_path: tile.path,
        tile_bytes: tile.bytes,
        tile_from_cache: tile.origin == TileOrigin::Cache,
        window_width: window.width(),
        window_height: window.height(),
        resolutions,
        elapsed: started.elapsed(),
    })
}

/// Open the tile and read the configured window on a blocking thread.
async fn load_window(path: PathBuf, config: &PreprocessorConfig) -> Result<Arc<RasterWindow>> {
    let bounds = config.aggregation.bounds;
    let started = Instant::now();

    let window = tokio::task::spawn_blocking(move || -> Result<RasterWindow> {
        let mut source = GeoTiffSource::open(&path)
            .with_context(|| format!("Failed to open tile {}", path.display()))?;
        let window = extract_window(&mut source, &bounds)
            .with_context(|| format!("Failed to read window {} from tile", bounds))?;
        Ok(window)
    })
    .await
    .context("Window extraction task panicked")??;

    info!(
        col_off = window.source_window().col_off,
        row_off = window.source_window().row_off,
        width = window.width(),
        height = window.height(),
        loss_pixels = window.loss_pixel_count(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Loaded raster window"
    );

    Ok(Arc::new(window))
}

#[instrument(skip(aggregator, window, config))]
async fn process_resolution(
    aggregator: &HexAggregator,
    window: &Arc<RasterWindow>,
    resolution: u8,
    config: &PreprocessorConfig,
) -> Result<ResolutionSummary> {
    let started = Instant::now();

    let result = {
        let aggregator = aggregator.clone();
        let window = Arc::clone(window);
        tokio::task::spawn_blocking(move || aggregator.run_resolution(&window, resolution))
            .await
            .context("Aggregation task panicked")?
            .with_context(|| format!("Aggregation failed at resolution {}", resolution))?
    };

    record_metrics(&result, started.elapsed());

    let doc = ForestLossDocument::from_result(&result, &config.aggregation.bounds, &config.source_label);
    let output_dir = config.output_dir.clone();
    let prefix = config.output_prefix.clone();
    let path = tokio::task::spawn_blocking(move || write_document(&output_dir, &prefix, &doc))
        .await
        .context("Output task panicked")?
        .with_context(|| format!("Failed to write document for resolution {}", resolution))?;

    Ok(ResolutionSummary {
        resolution,
        cells: result.total_cells(),
        total_loss: result.total_loss(),
        sampled: result.stats.sampled,
        skipped: result.stats.skipped(),
        path,
        elapsed: started.elapsed(),
    })
}

fn record_metrics(result: &AggregationResult, elapsed: Duration) {
    let resolution = result.resolution.to_string();
    let stats = &result.stats;

    gauge!("forest_hex_cells_total", "resolution" => resolution.clone())
        .set(result.total_cells() as f64);
    counter!("forest_hex_pixels_sampled_total", "resolution" => resolution.clone())
        .increment(stats.sampled);
    counter!("forest_hex_pixels_skipped_total", "resolution" => resolution.clone(), "reason" => "no_loss")
        .increment(stats.skipped_no_loss);
    counter!("forest_hex_pixels_skipped_total", "resolution" => resolution.clone(), "reason" => "out_of_range")
        .increment(stats.skipped_out_of_range);
    counter!("forest_hex_pixels_skipped_total", "resolution" => resolution.clone(), "reason" => "conversion")
        .increment(stats.skipped_conversion);
    histogram!("forest_hex_pass_duration_seconds", "resolution" => resolution)
        .record(elapsed.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_aggregator::{read_document, GeoBounds};
    use test_utils::{create_year_band_grid, raster::CASCADES_400, write_lossyear_geotiff, LossyearTiff};

    /// Config pointing at a pre-seeded cache, so no network is touched.
    fn offline_config(root: &std::path::Path) -> PreprocessorConfig {
        let mut config = PreprocessorConfig {
            tile_url: "https://example.invalid/tiles/cascades.tif".to_string(),
            cache_dir: root.join("cache"),
            output_dir: root.join("out"),
            offline: true,
            ..PreprocessorConfig::default()
        };
        config.aggregation.bounds = GeoBounds::new(44.4, 44.0, -121.8, -122.2);
        config.aggregation.sample_rate = 4;
        config.aggregation.resolutions = vec![5, 6];
        config
    }

    fn seed_cache(config: &PreprocessorConfig) -> Vec<u8> {
        std::fs::create_dir_all(&config.cache_dir).unwrap();
        let data = create_year_band_grid(CASCADES_400.width, CASCADES_400.height);
        write_lossyear_geotiff(
            &config.cache_dir.join("cascades.tif"),
            &LossyearTiff::new(CASCADES_400, &data).with_rows_per_strip(64),
        )
        .unwrap();
        data
    }

    #[tokio::test]
    async fn test_run_from_cached_tile() {
        let dir = tempfile::tempdir().unwrap();
        let config = offline_config(dir.path());
        seed_cache(&config);

        let summary = run(&config).await.unwrap();
        assert!(summary.tile_from_cache);
        assert_eq!(summary.window_width, 400);
        assert_eq!(summary.window_height, 400);
        assert_eq!(summary.resolutions.len(), 2);

        for res in &summary.resolutions {
            // 100 x 100 sampled positions, all valid, weight 16
            assert_eq!(res.total_loss, 100 * 100 * 16);
            assert_eq!(res.sampled, 10_000);

            let doc = read_document(&res.path).unwrap();
            assert_eq!(doc.resolution, res.resolution);
            assert_eq!(doc.total_cells, res.cells);
            assert_eq!(doc.source, "Hansen GFC 2023 v1.11");
            assert_eq!(doc.sample_rate, 4);
        }

        assert!(config.output_dir.join("forest-loss-res5.json").exists());
        assert!(config.output_dir.join("forest-loss-res6.json").exists());
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = offline_config(dir.path());
        config.aggregation.resolutions = vec![5, 99];
        // No cache seeded: a fetch attempt would also fail, but validation
        // must stop the run first and nothing is written.
        let err = run(&config).await.unwrap_err();
        assert!(format!("{:#}", err).contains("resolution"));
        assert!(!config.output_dir.exists());
    }

    #[tokio::test]
    async fn test_corrupt_tile_aborts_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = offline_config(dir.path());
        std::fs::create_dir_all(&config.cache_dir).unwrap();
        std::fs::write(config.cache_dir.join("cascades.tif"), b"not a tiff").unwrap();

        assert!(run(&config).await.is_err());
        assert!(!config.output_dir.exists());
    }
}
