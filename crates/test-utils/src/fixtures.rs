//! Common test fixtures for forest-hex tests.
//!
//! This module provides pre-defined bounds and raster layouts matching the
//! Hansen lossyear tiles and the regions aggregated from them.

/// Common bounding box definitions as `(west, south, east, north)`.
pub mod bbox {
    /// Extent of the Hansen 50N_130W lossyear tile
    pub const HANSEN_50N_130W: (f64, f64, f64, f64) = (-130.0, 40.0, -120.0, 50.0);

    /// Pacific Northwest region aggregated by default
    pub const PACIFIC_NORTHWEST: (f64, f64, f64, f64) = (-125.0, 42.0, -117.0, 49.0);

    /// A small box around the Oregon Cascades
    pub const CASCADES_SMALL: (f64, f64, f64, f64) = (-122.2, 44.0, -121.8, 44.4);

    /// Entirely east of the 50N_130W tile
    pub const EAST_OF_TILE: (f64, f64, f64, f64) = (-110.0, 42.0, -105.0, 45.0);

    /// Inverted (south > north)
    pub const INVERTED: (f64, f64, f64, f64) = (-125.0, 49.0, -117.0, 42.0);
}

/// Common raster layouts for testing.
pub mod raster {
    /// Full Hansen 10x10 degree tile at 0.00025 degree pixels
    pub const HANSEN_TILE: RasterSpec = RasterSpec {
        width: 40000,
        height: 40000,
        origin_lon: -130.0,
        origin_lat: 50.0,
        pixel_size: 0.00025,
    };

    /// Small synthetic tile over the Cascades (0.001 degree pixels)
    pub const CASCADES_400: RasterSpec = RasterSpec {
        width: 400,
        height: 400,
        origin_lon: -122.2,
        origin_lat: 44.4,
        pixel_size: 0.001,
    };

    /// Ragged layout that leaves partial tiles on the right and bottom
    pub const CASCADES_100X90: RasterSpec = RasterSpec {
        width: 100,
        height: 90,
        origin_lon: -122.2,
        origin_lat: 44.4,
        pixel_size: 0.001,
    };

    /// Coarse 1 degree grid over the Hansen tile extent
    pub const COARSE_10X10: RasterSpec = RasterSpec {
        width: 10,
        height: 10,
        origin_lon: -130.0,
        origin_lat: 50.0,
        pixel_size: 1.0,
    };

    /// North-up raster layout with square pixels.
    #[derive(Debug, Clone, Copy)]
    pub struct RasterSpec {
        pub width: usize,
        pub height: usize,
        /// Longitude of the top-left corner
        pub origin_lon: f64,
        /// Latitude of the top-left corner
        pub origin_lat: f64,
        pub pixel_size: f64,
    }

    impl RasterSpec {
        /// Returns the total number of pixels.
        pub fn size(&self) -> usize {
            self.width * self.height
        }

        /// Returns the extent as `(west, south, east, north)`.
        pub fn bounds(&self) -> (f64, f64, f64, f64) {
            (
                self.origin_lon,
                self.origin_lat - self.height as f64 * self.pixel_size,
                self.origin_lon + self.width as f64 * self.pixel_size,
                self.origin_lat,
            )
        }

        /// Center of pixel (row, col) as `(lon, lat)`.
        pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
            (
                self.origin_lon + (col as f64 + 0.5) * self.pixel_size,
                self.origin_lat - (row as f64 + 0.5) * self.pixel_size,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::raster::*;
    use crate::assert_approx_eq;

    #[test]
    fn test_hansen_tile_bounds() {
        let (west, south, east, north) = HANSEN_TILE.bounds();
        assert_approx_eq!(west, -130.0, 1e-9);
        assert_approx_eq!(south, 40.0, 1e-9);
        assert_approx_eq!(east, -120.0, 1e-9);
        assert_approx_eq!(north, 50.0, 1e-9);
        assert_eq!(HANSEN_TILE.size(), 1_600_000_000);
    }

    #[test]
    fn test_pixel_center() {
        let (lon, lat) = COARSE_10X10.pixel_center(0, 0);
        assert_approx_eq!(lon, -129.5, 1e-12);
        assert_approx_eq!(lat, 49.5, 1e-12);
    }
}
