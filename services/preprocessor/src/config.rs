//! Configuration for the forest-loss preprocessor.
//!
//! Loaded from an optional YAML file (with `${VAR}` / `${VAR:-default}`
//! substitution), then overridden by environment variables and finally by
//! command-line flags.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use hex_aggregator::AggregationConfig;

/// Hansen Global Forest Change 2023 lossyear tile covering 40-50N, 120-130W.
pub const DEFAULT_TILE_URL: &str = "https://storage.googleapis.com/earthenginepartners-hansen/GFC-2023-v1.11/Hansen_GFC-2023-v1.11_lossyear_50N_130W.tif";

/// Provenance label written into every document.
pub const DEFAULT_SOURCE_LABEL: &str = "Hansen GFC 2023 v1.11";

// ============================================================================
// Configuration Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessorConfig {
    /// URL of the lossyear GeoTIFF tile.
    pub tile_url: String,
    /// Directory the downloaded tile is cached in.
    pub cache_dir: PathBuf,
    /// Directory the per-resolution documents are written to.
    pub output_dir: PathBuf,
    /// Free-text provenance label for the input dataset.
    pub source_label: String,
    /// Documents are named `{output_prefix}-res{N}.json`.
    pub output_prefix: String,
    /// Fail instead of downloading when the tile is not cached.
    pub offline: bool,
    pub download: DownloadSettings,
    pub aggregation: AggregationConfig,
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self {
            tile_url: DEFAULT_TILE_URL.to_string(),
            cache_dir: PathBuf::from(".cache"),
            output_dir: PathBuf::from("public/data"),
            source_label: DEFAULT_SOURCE_LABEL.to_string(),
            output_prefix: "forest-loss".to_string(),
            offline: false,
            download: DownloadSettings::default(),
            aggregation: AggregationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    pub max_retries: u32,
    pub initial_retry_delay_secs: u64,
    pub max_retry_delay_secs: u64,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_retry_delay_secs: 2,
            max_retry_delay_secs: 120,
            connect_timeout_secs: 30,
            request_timeout_secs: 1800, // the tile is several hundred MB
            user_agent: concat!("forest-hex-preprocessor/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl DownloadSettings {
    pub fn initial_retry_delay(&self) -> Duration {
        Duration::from_secs(self.initial_retry_delay_secs)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_secs(self.max_retry_delay_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ============================================================================
// Loading Functions
// ============================================================================

impl PreprocessorConfig {
    /// Load from a YAML file with environment variable substitution.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read preprocessor config from {:?}", path.as_ref())
        })?;

        Self::from_yaml(&content)
            .with_context(|| format!("Invalid preprocessor config in {:?}", path.as_ref()))
    }

    /// Parse YAML content with environment variable substitution.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content)?;
        let config: PreprocessorConfig =
            serde_yaml::from_str(&expanded).context("Failed to parse preprocessor config YAML")?;
        Ok(config)
    }

    /// Apply `FOREST_*` environment overrides on top of the loaded values.
    pub fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("FOREST_TILE_URL") {
            self.tile_url = val;
        }
        if let Ok(val) = std::env::var("FOREST_CACHE_DIR") {
            self.cache_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("FOREST_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("FOREST_SOURCE_LABEL") {
            self.source_label = val;
        }

        self.aggregation.apply_env();
    }

    /// Validate everything that must hold before any download or sweep.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.tile_url.is_empty(), "tile_url cannot be empty");
        anyhow::ensure!(
            self.tile_url.starts_with("http://") || self.tile_url.starts_with("https://"),
            "tile_url must be an http(s) URL: {}",
            self.tile_url
        );
        anyhow::ensure!(
            !self.output_prefix.is_empty() && !self.output_prefix.contains('/'),
            "Invalid output_prefix: {:?}",
            self.output_prefix
        );
        anyhow::ensure!(
            self.download.initial_retry_delay_secs <= self.download.max_retry_delay_secs,
            "initial_retry_delay_secs ({}) exceeds max_retry_delay_secs ({})",
            self.download.initial_retry_delay_secs,
            self.download.max_retry_delay_secs
        );

        self.aggregation
            .validate()
            .context("Invalid aggregation config")?;

        Ok(())
    }

    /// File name the tile is cached under: the last path segment of the URL.
    pub fn tile_file_name(&self) -> Result<String> {
        let trimmed = self
            .tile_url
            .split(['?', '#'])
            .next()
            .unwrap_or_default();
        let name = trimmed.rsplit('/').next().unwrap_or_default();
        anyhow::ensure!(
            !name.is_empty(),
            "Cannot derive a file name from tile_url {}",
            self.tile_url
        );
        Ok(name.to_string())
    }
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in YAML content.
/// Supports ${VAR} and ${VAR:-default} syntax.
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'

            let mut var_expr = String::new();
            let mut brace_count = 1;

            while brace_count > 0 {
                match chars.next() {
                    Some('{') => {
                        brace_count += 1;
                        var_expr.push('{');
                    }
                    Some('}') => {
                        brace_count -= 1;
                        if brace_count > 0 {
                            var_expr.push('}');
                        }
                    }
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

/// Resolve variable expression (supports VAR and VAR:-default syntax).
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

// ============================================================================
// Tests
// ============================================================================
