//! Tile download with an on-disk cache.
//!
//! Key features:
//! - Reuses a cached tile when present, never re-downloading it
//! - Streams to `<name>.partial` and renames on completion
//! - Exponential backoff retry on failures
//! - File integrity verification via Content-Length

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use futures::StreamExt;
use reqwest::{header, Client, Response, StatusCode};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::config::DownloadSettings;

/// Where a tile came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileOrigin {
    Cache,
    Downloaded,
}

/// A tile ready on local disk.
#[derive(Debug, Clone)]
pub struct FetchedTile {
    pub path: PathBuf,
    pub bytes: u64,
    pub origin: TileOrigin,
}

/// Downloads a raster tile once and serves it from the cache afterwards.
pub struct TileFetcher {
    client: Client,
    settings: DownloadSettings,
    cache_dir: PathBuf,
    offline: bool,
}

impl TileFetcher {
    /// Create a fetcher caching into `cache_dir`.
    pub fn new(settings: DownloadSettings, cache_dir: impl Into<PathBuf>, offline: bool) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .connect_timeout(settings.connect_timeout())
            .user_agent(settings.user_agent.clone())
            .tcp_nodelay(true)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            settings,
            cache_dir: cache_dir.into(),
            offline,
        })
    }

    /// Path a tile named `file_name` is cached at.
    pub fn cached_path(&self, file_name: &str) -> PathBuf {
        self.cache_dir.join(file_name)
    }

    /// Return the cached tile, downloading it first if needed.
    #[instrument(skip(self), fields(cache_dir = %self.cache_dir.display()))]
    pub async fn fetch(&self, url: &str, file_name: &str) -> Result<FetchedTile> {
        let final_path = self.cached_path(file_name);

        if let Ok(metadata) = fs::metadata(&final_path).await {
            info!(path = %final_path.display(), bytes = metadata.len(), "Using cached tile");
            return Ok(FetchedTile {
                path: final_path,
                bytes: metadata.len(),
                origin: TileOrigin::Cache,
            });
        }

        if self.offline {
            bail!(
                "Tile {} is not cached and offline mode is enabled",
                final_path.display()
            );
        }

        fs::create_dir_all(&self.cache_dir)
            .await
            .with_context(|| format!("Failed to create cache dir {}", self.cache_dir.display()))?;

        let temp_path = self.cache_dir.join(format!("{}.partial", file_name));
        let started = Instant::now();
        let mut retry_count = 0;
        let mut delay = self.settings.initial_retry_delay();

        info!(url = %url, path = %final_path.display(), "Downloading tile");

        loop {
            match self.download_once(url, &temp_path).await {
                Ok(bytes) => {
                    fs::rename(&temp_path, &final_path).await.with_context(|| {
                        format!("Failed to move tile into {}", final_path.display())
                    })?;

                    info!(
                        path = %final_path.display(),
                        bytes,
                        elapsed_secs = started.elapsed().as_secs(),
                        "Download completed"
                    );

                    return Ok(FetchedTile {
                        path: final_path,
                        bytes,
                        origin: TileOrigin::Downloaded,
                    });
                }
                Err(e) => {
                    fs::remove_file(&temp_path).await.ok();
                    retry_count += 1;

                    if retry_count > self.settings.max_retries {
                        return Err(anyhow!(
                            "Download of {} failed after {} attempts: {}",
                            url,
                            retry_count,
                            e
                        ));
                    }

                    warn!(
                        error = %e,
                        retry = retry_count,
                        max_retries = self.settings.max_retries,
                        delay_secs = delay.as_secs(),
                        "Download failed, retrying"
                    );

                    tokio::time::sleep(delay).await;
                    delay = next_delay(delay, self.settings.max_retry_delay());
                }
            }
        }
    }

    /// One download attempt into `temp_path`. Returns the byte count.
    async fn download_once(&self, url: &str, temp_path: &Path) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("HTTP request failed")?;

        match response.status() {
            StatusCode::OK => {}
            status => bail!("HTTP error: {}", status),
        }

        let expected = response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());

        let written = stream_to_file(response, temp_path, expected).await?;

        if let Some(expected) = expected {
            if written != expected {
                bail!(
                    "Download size mismatch: expected {} bytes, got {}",
                    expected,
                    written
                );
            }
        }

        Ok(written)
    }
}

/// Stream the response body into a fresh file.
async fn stream_to_file(response: Response, path: &Path, total: Option<u64>) -> Result<u64> {
    let mut file = File::create(path)
        .await
        .context("Failed to open output file")?;

    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    let mut since_log = 0u64;
    let log_interval = 64 * 1024 * 1024;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Error reading response chunk")?;
        file.write_all(&chunk)
            .await
            .context("Error writing to file")?;

        written += chunk.len() as u64;
        since_log += chunk.len() as u64;

        if since_log >= log_interval {
            since_log = 0;
            debug!(
                downloaded = written,
                total = ?total,
                percent = total.map(|t| format!("{:.1}%", written as f64 / t as f64 * 100.0)),
                "Download progress"
            );
        }
    }

    // Flush and sync
    file.flush().await?;
    file.sync_all().await?;

    Ok(written)
}

/// Exponential backoff step, capped at `max`.
fn next_delay(current: Duration, max: Duration) -> Duration {
    std::cmp::min(current * 2, max)
}
