//! Configuration for an aggregation run.

use serde::{Deserialize, Serialize};

use forest_common::GeoBounds;

use crate::error::{AggregationError, Result};
use crate::hexgrid::MAX_RESOLUTION;

/// Explicit configuration passed to the aggregation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Geographic bounds used to window the raster.
    pub bounds: GeoBounds,

    /// Sub-sampling stride in pixels. 1 visits every pixel.
    pub sample_rate: u32,

    /// Hexagon resolutions to produce, in processing order.
    pub resolutions: Vec<u8>,

    /// Sweep sampled rows on the rayon thread pool.
    pub parallel: bool,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            // Pacific Northwest subset of the 50N_130W tile
            bounds: GeoBounds::new(49.0, 42.0, -117.0, -125.0),
            sample_rate: 10,
            resolutions: vec![4, 5, 6, 7],
            parallel: true,
        }
    }
}

impl AggregationConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from `FOREST_*` environment variables. Unset or
    /// unparseable variables leave the current value in place.
    pub fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("FOREST_BOUNDS") {
            if let Ok(bounds) = GeoBounds::from_bbox_string(&val) {
                self.bounds = bounds;
            }
        }

        if let Ok(val) = std::env::var("FOREST_SAMPLE_RATE") {
            if let Ok(rate) = val.parse() {
                self.sample_rate = rate;
            }
        }

        if let Ok(val) = std::env::var("FOREST_RESOLUTIONS") {
            if let Ok(resolutions) = parse_resolution_list(&val) {
                self.resolutions = resolutions;
            }
        }

        if let Ok(val) = std::env::var("FOREST_PARALLEL") {
            self.parallel = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Validate the configuration. Every error here is fatal and must be
    /// reported before the first sweep.
    pub fn validate(&self) -> Result<()> {
        self.bounds.validate()?;

        if self.sample_rate == 0 {
            return Err(AggregationError::config("sample_rate must be > 0"));
        }

        if self.resolutions.is_empty() {
            return Err(AggregationError::config(
                "at least one resolution is required",
            ));
        }

        if let Some(&res) = self.resolutions.iter().find(|&&r| r > MAX_RESOLUTION) {
            return Err(AggregationError::UnsupportedResolution(res));
        }

        let mut seen = self.resolutions.clone();
        seen.sort_unstable();
        seen.dedup();
        if seen.len() != self.resolutions.len() {
            return Err(AggregationError::config(format!(
                "duplicate resolutions in {:?}",
                self.resolutions
            )));
        }

        Ok(())
    }

    /// Weight applied to each accepted sample.
    pub fn sample_weight(&self) -> u64 {
        let rate = self.sample_rate as u64;
        rate * rate
    }
}

/// Parse a comma separated list of resolutions, e.g. `"4,5,6,7"`.
pub fn parse_resolution_list(s: &str) -> Result<Vec<u8>> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u8>()
                .map_err(|_| AggregationError::config(format!("invalid resolution '{}'", part)))
        })
        .collect()
}
