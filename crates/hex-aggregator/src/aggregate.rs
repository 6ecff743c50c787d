//! Raster-to-hexagon aggregation.
//!
//! A pass visits every `sample_rate`-th row and column of a
//! [`RasterWindow`], drops pixels without a valid lossyear code, maps each
//! remaining pixel center to a hexagonal cell and adds `sample_rate²` to
//! that cell's total and per-year bucket. The weight stands in for the
//! unvisited pixels around each sample, assuming local homogeneity.
//!
//! The parallel sweep partitions the sampled rows across the rayon pool.
//! Each worker folds into its own [`CellAccumulator`]; partial results are
//! summed afterwards, so the outcome is identical to the sequential sweep.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use chrono::Utc;
use h3o::CellIndex;
use rayon::prelude::*;
use tracing::info;

use crate::config::AggregationConfig;
use crate::error::{AggregationError, Result};
use crate::hexgrid::{H3Indexer, HexIndexer};
use crate::raster::RasterWindow;
use crate::types::{AggregationResult, AggregationStats, HexCellRecord, PixelClass};

/// How sampled rows are distributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SweepMode {
    /// One thread, rows in order.
    #[default]
    Sequential,
    /// Rows partitioned across the rayon thread pool.
    Parallel,
}

impl SweepMode {
    /// Mode selected by a config flag.
    pub fn from_flag(parallel: bool) -> Self {
        if parallel {
            Self::Parallel
        } else {
            Self::Sequential
        }
    }
}

/// Working state of a sweep: cells touched so far plus pass counters.
#[derive(Debug, Default)]
pub struct CellAccumulator {
    cells: HashMap<CellIndex, HexCellRecord>,
    stats: AggregationStats,
}

impl CellAccumulator {
    /// Sweep one sampled row.
    fn sweep_row<I: HexIndexer + ?Sized>(
        &mut self,
        window: &RasterWindow,
        row: usize,
        stride: usize,
        weight: u64,
        indexer: &I,
    ) {
        let Some(values) = window.row(row) else {
            return;
        };
        for col in (0..values.len()).step_by(stride) {
            self.stats.sampled += 1;

            let code = match PixelClass::of(values[col]) {
                PixelClass::NoLoss => {
                    self.stats.skipped_no_loss += 1;
                    continue;
                }
                PixelClass::OutOfRange => {
                    self.stats.skipped_out_of_range += 1;
                    continue;
                }
                PixelClass::Loss(code) => code,
            };

            let (lon, lat) = window.transform().pixel_center(row, col);
            let cell = match indexer.cell_for(lat, lon) {
                Ok(cell) => cell,
                Err(_) => {
                    self.stats.skipped_conversion += 1;
                    continue;
                }
            };

            self.cells.entry(cell).or_default().add(code, weight);
            self.stats.accepted += 1;
        }
    }

    /// Sum another accumulator into this one.
    pub fn merge(self, other: CellAccumulator) -> Self {
        // Fold the smaller map into the larger one
        let (mut into, from) = if self.cells.len() >= other.cells.len() {
            (self, other)
        } else {
            (other, self)
        };

        for (cell, record) in from.cells {
            into.cells.entry(cell).or_default().merge(record);
        }
        into.stats.merge(&from.stats);
        into
    }

    /// Freeze into an ordered result.
    fn finish(self, resolution: u8, sample_rate: u32) -> AggregationResult {
        AggregationResult {
            resolution,
            sample_rate,
            cells: self.cells.into_iter().collect::<BTreeMap<_, _>>(),
            stats: self.stats,
            completed_at: Utc::now(),
        }
    }
}

/// Aggregate `window` into H3 cells at `resolution` with the given stride.
///
/// Fails only on invalid arguments (stride 0, resolution above 15); those
/// are reported before any pixel is visited.
pub fn aggregate(window: &RasterWindow, resolution: u8, sample_rate: u32) -> Result<AggregationResult> {
    let indexer =
        H3Indexer::new(resolution).map_err(|_| AggregationError::UnsupportedResolution(resolution))?;
    aggregate_with(window, &indexer, sample_rate, SweepMode::Sequential)
}

/// Aggregate with an explicit indexer and sweep mode.
pub fn aggregate_with<I: HexIndexer + ?Sized>(
    window: &RasterWindow,
    indexer: &I,
    sample_rate: u32,
    mode: SweepMode,
) -> Result<AggregationResult> {
    if sample_rate == 0 {
        return Err(AggregationError::config("sample_rate must be > 0"));
    }

    let started = Instant::now();
    let stride = sample_rate as usize;
    let weight = sample_rate as u64 * sample_rate as u64;
    let sampled_rows = (window.height() + stride - 1) / stride;

    let accumulator = match mode {
        SweepMode::Sequential => {
            let mut acc = CellAccumulator::default();
            for i in 0..sampled_rows {
                acc.sweep_row(window, i * stride, stride, weight, indexer);
            }
            acc
        }
        SweepMode::Parallel => (0..sampled_rows)
            .into_par_iter()
            .fold(CellAccumulator::default, |mut acc, i| {
                acc.sweep_row(window, i * stride, stride, weight, indexer);
                acc
            })
            .reduce(CellAccumulator::default, CellAccumulator::merge),
    };

    let result = accumulator.finish(indexer.resolution(), sample_rate);

    info!(
        resolution = result.resolution,
        sample_rate,
        mode = ?mode,
        width = window.width(),
        height = window.height(),
        cells = result.total_cells(),
        total_loss = result.total_loss(),
        sampled = result.stats.sampled,
        accepted = result.stats.accepted,
        skipped = result.stats.skipped(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Aggregation pass complete"
    );

    Ok(result)
}

/// Drives one aggregation pass per configured resolution over a shared
/// window.
#[derive(Debug, Clone)]
pub struct HexAggregator {
    config: AggregationConfig,
}

impl HexAggregator {
    /// Create an aggregator, validating the configuration up front.
    pub fn new(config: AggregationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Configuration in use.
    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    /// Run a single pass at `resolution`.
    pub fn run_resolution(&self, window: &RasterWindow, resolution: u8) -> Result<AggregationResult> {
        let indexer = H3Indexer::new(resolution)
            .map_err(|_| AggregationError::UnsupportedResolution(resolution))?;
        aggregate_with(
            window,
            &indexer,
            self.config.sample_rate,
            SweepMode::from_flag(self.config.parallel),
        )
    }

    /// Run every configured resolution in order.
    pub fn run_all(&self, window: &RasterWindow) -> Result<Vec<AggregationResult>> {
        self.config
            .resolutions
            .iter()
            .map(|&resolution| self.run_resolution(window, resolution))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hexgrid::ConversionError;
    use forest_common::GeoTransform;
    use h3o::{LatLng, Resolution};

    /// 2x2 window with 0.5 degree pixels anchored at 45N 122W.
    fn scenario_window() -> RasterWindow {
        let gt = GeoTransform::north_up(-122.0, 45.0, 0.5, -0.5);
        RasterWindow::from_rows(&[vec![0, 5], vec![23, 24]], gt).unwrap()
    }

    fn h3_cell(lat: f64, lon: f64, res: Resolution) -> CellIndex {
        LatLng::new(lat, lon).unwrap().to_cell(res)
    }

    /// Indexer that fails for every coordinate west of a meridian.
    struct WestFails {
        inner: H3Indexer,
        meridian: f64,
    }

    impl HexIndexer for WestFails {
        fn resolution(&self) -> u8 {
            self.inner.resolution()
        }

        fn cell_for(&self, lat: f64, lon: f64) -> std::result::Result<CellIndex, ConversionError> {
            if lon < self.meridian {
                return Err(ConversionError::InvalidCoordinate { lat, lon });
            }
            self.inner.cell_for(lat, lon)
        }
    }

    #[test]
    fn test_scenario_two_by_two() {
        let window = scenario_window();
        let result = aggregate(&window, 5, 1).unwrap();

        // Pixel (0, 1) center: lon -121.25, lat 44.75
        // Pixel (1, 0) center: lon -121.75, lat 44.25
        let a = h3_cell(44.75, -121.25, Resolution::Five);
        let b = h3_cell(44.25, -121.75, Resolution::Five);
        assert_ne!(a, b);

        assert_eq!(result.total_cells(), 2);
        let rec_a = result.get(&a).unwrap();
        assert_eq!(rec_a.total_loss, 1);
        assert_eq!(rec_a.by_year, BTreeMap::from([(5, 1)]));
        let rec_b = result.get(&b).unwrap();
        assert_eq!(rec_b.total_loss, 1);
        assert_eq!(rec_b.by_year, BTreeMap::from([(23, 1)]));

        assert_eq!(result.stats.sampled, 4);
        assert_eq!(result.stats.accepted, 2);
        assert_eq!(result.stats.skipped_no_loss, 1);
        assert_eq!(result.stats.skipped_out_of_range, 1);
    }

    #[test]
    fn test_all_zero_window_is_empty() {
        let gt = GeoTransform::north_up(-122.0, 45.0, 0.01, -0.01);
        let window = RasterWindow::new(vec![0; 50 * 40], 50, 40, gt).unwrap();
        let result = aggregate(&window, 6, 1).unwrap();
        assert!(result.is_empty());
        assert_eq!(result.total_loss(), 0);
        assert_eq!(result.stats.skipped_no_loss, 2000);
    }

    #[test]
    fn test_empty_window() {
        let gt = GeoTransform::north_up(-122.0, 45.0, 0.01, -0.01);
        let window = RasterWindow::new(Vec::new(), 0, 0, gt).unwrap();
        let result = aggregate(&window, 6, 3).unwrap();
        assert!(result.is_empty());
        assert_eq!(result.stats.sampled, 0);
    }

    #[test]
    fn test_sample_rate_weights_visited_pixels() {
        // 5x5 grid of code 7; stride 2 visits rows/cols {0, 2, 4} = 9 pixels
        let gt = GeoTransform::north_up(-122.0, 45.0, 0.001, -0.001);
        let window = RasterWindow::new(vec![7; 25], 5, 5, gt).unwrap();
        let result = aggregate(&window, 4, 2).unwrap();

        assert_eq!(result.stats.sampled, 9);
        assert_eq!(result.stats.accepted, 9);
        assert_eq!(result.total_loss(), 9 * 4);
        for record in result.cells.values() {
            assert_eq!(record.total_loss, record.year_sum());
            assert_eq!(record.by_year.keys().copied().collect::<Vec<_>>(), vec![7]);
        }
    }

    #[test]
    fn test_stride_larger_than_window() {
        let gt = GeoTransform::north_up(-122.0, 45.0, 0.001, -0.001);
        let window = RasterWindow::new(vec![3; 6], 3, 2, gt).unwrap();
        let result = aggregate(&window, 7, 10).unwrap();

        // Only (0, 0) is sampled
        assert_eq!(result.stats.sampled, 1);
        assert_eq!(result.total_loss(), 100);
    }

    #[test]
    fn test_conversion_errors_skip_pixel() {
        let gt = GeoTransform::north_up(-122.0, 45.0, 0.5, -0.5);
        let window = RasterWindow::from_rows(&[vec![1, 2], vec![3, 4]], gt).unwrap();
        let indexer = WestFails {
            inner: H3Indexer::new(5).unwrap(),
            meridian: -121.5,
        };

        let result = aggregate_with(&window, &indexer, 1, SweepMode::Sequential).unwrap();
        // Column 0 centers sit at -121.75 and fail; column 1 survives
        assert_eq!(result.stats.skipped_conversion, 2);
        assert_eq!(result.stats.accepted, 2);
        assert_eq!(result.total_loss(), 2);
        let codes: Vec<u8> = result
            .cells
            .values()
            .flat_map(|r| r.by_year.keys().copied())
            .collect();
        assert!(codes.contains(&2));
        assert!(codes.contains(&4));
    }

    #[test]
    fn test_invalid_arguments() {
        let window = scenario_window();
        assert!(matches!(
            aggregate(&window, 16, 1),
            Err(AggregationError::UnsupportedResolution(16))
        ));
        assert!(matches!(
            aggregate(&window, 5, 0),
            Err(AggregationError::ConfigError(_))
        ));
    }

    #[test]
    fn test_accumulator_merge_sums_matching_cells() {
        let gt = GeoTransform::north_up(-122.0, 45.0, 0.001, -0.001);
        let window = RasterWindow::new(vec![9; 16], 4, 4, gt).unwrap();
        let indexer = H3Indexer::new(4).unwrap();

        let mut top = CellAccumulator::default();
        let mut bottom = CellAccumulator::default();
        for row in 0..2 {
            top.sweep_row(&window, row, 1, 1, &indexer);
        }
        for row in 2..4 {
            bottom.sweep_row(&window, row, 1, 1, &indexer);
        }

        let merged = top.merge(bottom).finish(4, 1);
        assert_eq!(merged.stats.sampled, 16);
        assert_eq!(merged.total_loss(), 16);
    }

    #[test]
    fn test_sweep_row_past_end_is_noop() {
        let window = scenario_window();
        let indexer = H3Indexer::new(5).unwrap();
        let mut acc = CellAccumulator::default();

        acc.sweep_row(&window, 2, 1, 1, &indexer);
        acc.sweep_row(&window, 100, 1, 1, &indexer);

        let result = acc.finish(5, 1);
        assert_eq!(result.stats.sampled, 0);
        assert!(result.cells.is_empty());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let gt = GeoTransform::north_up(-123.0, 46.0, 0.002, -0.002);
        let (width, height) = (97, 83);
        let data: Vec<u8> = (0..width * height).map(|i| ((i * 7) % 27) as u8).collect();
        let window = RasterWindow::new(data, width, height, gt).unwrap();
        let indexer = H3Indexer::new(7).unwrap();

        for rate in [1, 2, 3, 10] {
            let seq = aggregate_with(&window, &indexer, rate, SweepMode::Sequential).unwrap();
            let par = aggregate_with(&window, &indexer, rate, SweepMode::Parallel).unwrap();
            assert_eq!(seq.cells, par.cells, "sample rate {}", rate);
            assert_eq!(seq.stats, par.stats, "sample rate {}", rate);
        }
    }

    #[test]
    fn test_hex_aggregator_runs_each_resolution() {
        let config = AggregationConfig {
            sample_rate: 1,
            resolutions: vec![4, 6],
            ..AggregationConfig::default()
        };
        let aggregator = HexAggregator::new(config).unwrap();
        let results = aggregator.run_all(&scenario_window()).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].resolution, 4);
        assert_eq!(results[1].resolution, 6);
        for result in &results {
            assert_eq!(result.total_loss(), 2);
        }
    }

    #[test]
    fn test_hex_aggregator_rejects_bad_config() {
        let config = AggregationConfig {
            sample_rate: 0,
            ..AggregationConfig::default()
        };
        assert!(HexAggregator::new(config).is_err());
    }
}
