//! Raster sources and windowed extraction.
//!
//! A [`RasterSource`] is anything that can report its georeferencing and
//! read a rectangular block of single-band `u8` values. [`extract_window`]
//! turns geographic bounds into a [`RasterWindow`]: the values inside the
//! bounds plus a transform valid for indexing that block.

mod geotiff;

pub use geotiff::GeoTiffSource;

use forest_common::{GeoBounds, GeoTransform, PixelWindow};
use tracing::{debug, warn};

use crate::error::{AggregationError, Result};
use crate::types::PixelClass;

/// A single-band raster that can be read window by window.
pub trait RasterSource {
    /// Transform of the full raster.
    fn transform(&self) -> GeoTransform;

    /// Raster size as (width, height) in pixels.
    fn dimensions(&self) -> (usize, usize);

    /// Read the values inside `window`, row-major.
    fn read(&mut self, window: &PixelWindow) -> Result<Vec<u8>>;

    /// Pixel window covering `bounds`, clipped to the raster extent.
    fn window_from_bounds(&self, bounds: &GeoBounds) -> Result<PixelWindow> {
        let (width, height) = self.dimensions();
        Ok(self.transform().window_for_bounds(bounds, width, height)?)
    }

    /// Transform valid for indexing the values read from `window`.
    fn transform_for(&self, window: &PixelWindow) -> GeoTransform {
        self.transform().for_window(window)
    }

    /// Geographic extent of the full raster (north-up transforms).
    fn extent(&self) -> GeoBounds {
        let (width, height) = self.dimensions();
        let gt = self.transform();
        let (x0, y0) = gt.pixel_to_geo(0.0, 0.0);
        let (x1, y1) = gt.pixel_to_geo(height as f64, width as f64);
        GeoBounds::new(y0.max(y1), y0.min(y1), x0.max(x1), x0.min(x1))
    }
}

/// Values of a raster window together with their transform.
///
/// Immutable once produced; shared read-only across every resolution pass.
#[derive(Debug, Clone)]
pub struct RasterWindow {
    data: Vec<u8>,
    width: usize,
    height: usize,
    transform: GeoTransform,
    source_window: PixelWindow,
}

impl RasterWindow {
    /// Build a window from row-major values, checking the buffer size.
    pub fn new(
        data: Vec<u8>,
        width: usize,
        height: usize,
        transform: GeoTransform,
    ) -> Result<Self> {
        if data.len() != width * height {
            return Err(AggregationError::read_failed(format!(
                "window data has {} values, expected {}x{}",
                data.len(),
                width,
                height
            )));
        }

        Ok(Self {
            data,
            width,
            height,
            transform,
            source_window: PixelWindow::full(width, height),
        })
    }

    /// Build a window from nested rows. Every row must have the same length.
    pub fn from_rows(rows: &[Vec<u8>], transform: GeoTransform) -> Result<Self> {
        let height = rows.len();
        let width = rows.first().map(Vec::len).unwrap_or(0);
        if rows.iter().any(|row| row.len() != width) {
            return Err(AggregationError::read_failed("ragged rows"));
        }

        let data = rows.iter().flatten().copied().collect();
        Self::new(data, width, height, transform)
    }

    /// Pixel values, row-major and top-to-bottom.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Transform mapping window (row, col) to (lon, lat).
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Where the window sits in the source raster.
    pub fn source_window(&self) -> PixelWindow {
        self.source_window
    }

    /// Value at (row, col).
    pub fn get(&self, row: usize, col: usize) -> Option<u8> {
        if row >= self.height || col >= self.width {
            return None;
        }
        self.data.get(row * self.width + col).copied()
    }

    /// Slice of one row, `None` past the last row.
    #[inline]
    pub fn row(&self, row: usize) -> Option<&[u8]> {
        if row >= self.height {
            return None;
        }
        let start = row * self.width;
        self.data.get(start..start + self.width)
    }

    /// Number of pixels carrying a valid lossyear code.
    pub fn loss_pixel_count(&self) -> usize {
        self.data
            .iter()
            .filter(|&&v| matches!(PixelClass::of(v), PixelClass::Loss(_)))
            .count()
    }

    /// Check if the window holds no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Read the part of `source` covered by `bounds`.
///
/// Bounds outside the raster coverage yield an empty or clipped window;
/// callers are expected to pass bounds inside the tile. Read errors are
/// returned as-is and are fatal for the run.
pub fn extract_window<S: RasterSource + ?Sized>(
    source: &mut S,
    bounds: &GeoBounds,
) -> Result<RasterWindow> {
    let window = source.window_from_bounds(bounds)?;
    let transform = source.transform_for(&window);

    let extent = source.extent();
    let covered = extent
        .intersection(bounds)
        .map(|b| b.width() * b.height())
        .unwrap_or(0.0);
    if covered < bounds.width() * bounds.height() * (1.0 - 1e-9) {
        warn!(
            bounds = %bounds,
            extent = %extent,
            "Bounds extend beyond raster coverage, window clipped"
        );
    }

    let data = if window.is_empty() {
        Vec::new()
    } else {
        source.read(&window)?
    };

    if data.len() != window.len() {
        return Err(AggregationError::read_failed(format!(
            "source returned {} values for a {}x{} window",
            data.len(),
            window.width,
            window.height
        )));
    }

    debug!(
        col_off = window.col_off,
        row_off = window.row_off,
        width = window.width,
        height = window.height,
        bounds = %bounds,
        "Extracted raster window"
    );

    Ok(RasterWindow {
        data,
        width: window.width,
        height: window.height,
        transform,
        source_window: window,
    })
}

/// A raster held entirely in memory.
#[derive(Debug, Clone)]
pub struct InMemoryRaster {
    data: Vec<u8>,
    width: usize,
    height: usize,
    transform: GeoTransform,
}

impl InMemoryRaster {
    /// Wrap row-major values with their transform.
    pub fn new(data: Vec<u8>, width: usize, height: usize, transform: GeoTransform) -> Result<Self> {
        if data.len() != width * height {
            return Err(AggregationError::open_failed(format!(
                "raster data has {} values, expected {}x{}",
                data.len(),
                width,
                height
            )));
        }

        Ok(Self {
            data,
            width,
            height,
            transform,
        })
    }
}

impl RasterSource for InMemoryRaster {
    fn transform(&self) -> GeoTransform {
        self.transform
    }

    fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn read(&mut self, window: &PixelWindow) -> Result<Vec<u8>> {
        if !window.fits_within(self.width, self.height) {
            return Err(AggregationError::out_of_bounds(
                format!("{:?}", window),
                format!("{}x{}", self.width, self.height),
            ));
        }

        let mut out = Vec::with_capacity(window.len());
        for row in window.row_off..window.row_end() {
            let start = row * self.width + window.col_off;
            out.extend_from_slice(&self.data[start..start + window.width]);
        }
        Ok(out)
    }
}
