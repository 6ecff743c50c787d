//! Affine pixel-to-geographic transforms and pixel-space windows.

use serde::{Deserialize, Serialize};

use crate::bounds::GeoBounds;
use crate::error::{GeoError, GeoResult};

/// Tolerance (in pixels) applied when rounding fractional window edges, so
/// bounds that fall exactly on a pixel edge do not pick up an extra row or
/// column from floating point noise.
const EDGE_EPSILON: f64 = 1e-9;

/// An affine transform from (row, col) pixel space to (lon, lat).
///
/// Coefficients follow the GDAL geotransform layout:
///
/// ```text
/// lon = origin_x + col * pixel_width  + row * row_rotation
/// lat = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// `(origin_x, origin_y)` is the outer corner of pixel (0, 0). For a
/// north-up raster `pixel_height` is negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub row_rotation: f64,
    pub origin_y: f64,
    pub col_rotation: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Create a north-up transform without rotation terms.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            pixel_width,
            row_rotation: 0.0,
            origin_y,
            col_rotation: 0.0,
            pixel_height,
        }
    }

    /// Build from a GDAL-ordered coefficient array.
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            origin_x: gt[0],
            pixel_width: gt[1],
            row_rotation: gt[2],
            origin_y: gt[3],
            col_rotation: gt[4],
            pixel_height: gt[5],
        }
    }

    /// Coefficients in GDAL order.
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// True when the transform has no rotation or shear.
    pub fn is_north_up(&self) -> bool {
        self.row_rotation == 0.0 && self.col_rotation == 0.0
    }

    /// Map fractional pixel coordinates to (lon, lat).
    pub fn pixel_to_geo(&self, row: f64, col: f64) -> (f64, f64) {
        let lon = self.origin_x + col * self.pixel_width + row * self.row_rotation;
        let lat = self.origin_y + col * self.col_rotation + row * self.pixel_height;
        (lon, lat)
    }

    /// Coordinate of the centroid of pixel (row, col) as (lon, lat).
    #[inline]
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        self.pixel_to_geo(row as f64 + 0.5, col as f64 + 0.5)
    }

    /// Map (lon, lat) back to fractional (row, col).
    pub fn geo_to_pixel(&self, lon: f64, lat: f64) -> GeoResult<(f64, f64)> {
        let det = self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation;
        if det == 0.0 || !det.is_finite() {
            return Err(GeoError::NonInvertibleTransform);
        }

        let dx = lon - self.origin_x;
        let dy = lat - self.origin_y;
        let col = (dx * self.pixel_height - dy * self.row_rotation) / det;
        let row = (dy * self.pixel_width - dx * self.col_rotation) / det;

        if !row.is_finite() || !col.is_finite() {
            return Err(GeoError::UnmappableCoordinate { lon, lat });
        }

        Ok((row, col))
    }

    /// Transform valid for indexing inside `window`: pixel (0, 0) of the
    /// result is pixel (row_off, col_off) of this transform.
    pub fn for_window(&self, window: &PixelWindow) -> Self {
        let (origin_x, origin_y) =
            self.pixel_to_geo(window.row_off as f64, window.col_off as f64);
        Self {
            origin_x,
            origin_y,
            ..*self
        }
    }

    /// Compute the pixel window covering `bounds`, clipped to a raster of
    /// `raster_width` x `raster_height` pixels.
    ///
    /// Offsets are floored and far edges ceiled so every pixel touched by the
    /// bounds is included. Bounds entirely outside the raster produce an
    /// empty window rather than an error.
    pub fn window_for_bounds(
        &self,
        bounds: &GeoBounds,
        raster_width: usize,
        raster_height: usize,
    ) -> GeoResult<PixelWindow> {
        if !self.is_north_up() {
            return Err(GeoError::RotatedTransform);
        }

        let (row_a, col_a) = self.geo_to_pixel(bounds.west, bounds.north)?;
        let (row_b, col_b) = self.geo_to_pixel(bounds.east, bounds.south)?;

        let row_start = clip_edge((row_a.min(row_b) + EDGE_EPSILON).floor(), raster_height);
        let row_end = clip_edge((row_a.max(row_b) - EDGE_EPSILON).ceil(), raster_height);
        let col_start = clip_edge((col_a.min(col_b) + EDGE_EPSILON).floor(), raster_width);
        let col_end = clip_edge((col_a.max(col_b) - EDGE_EPSILON).ceil(), raster_width);

        Ok(PixelWindow::new(
            col_start,
            row_start,
            col_end.saturating_sub(col_start),
            row_end.saturating_sub(row_start),
        ))
    }

    /// Pixel size in degrees as (width, height), both positive.
    pub fn pixel_size(&self) -> (f64, f64) {
        (self.pixel_width.abs(), self.pixel_height.abs())
    }
}

/// Clamp a rounded pixel edge into `[0, limit]`.
fn clip_edge(edge: f64, limit: usize) -> usize {
    if edge <= 0.0 {
        0
    } else if edge >= limit as f64 {
        limit
    } else {
        edge as usize
    }
}

/// A rectangular region of a raster in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PixelWindow {
    pub col_off: usize,
    pub row_off: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelWindow {
    /// Create a new window.
    pub fn new(col_off: usize, row_off: usize, width: usize, height: usize) -> Self {
        Self {
            col_off,
            row_off,
            width,
            height,
        }
    }

    /// Window covering a full raster.
    pub fn full(width: usize, height: usize) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Number of pixels in the window.
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    /// True when the window covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Exclusive end column.
    pub fn col_end(&self) -> usize {
        self.col_off + self.width
    }

    /// Exclusive end row.
    pub fn row_end(&self) -> usize {
        self.row_off + self.height
    }

    /// True when the window lies inside a raster of the given size.
    pub fn fits_within(&self, raster_width: usize, raster_height: usize) -> bool {
        self.col_end() <= raster_width && self.row_end() <= raster_height
    }
}
