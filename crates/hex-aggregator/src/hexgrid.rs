//! Coordinate to hexagon conversion.
//!
//! The aggregation engine only needs one operation from the hexagonal grid:
//! "which cell contains this coordinate at this resolution". That operation
//! is the [`HexIndexer`] trait; [`H3Indexer`] implements it with `h3o`.

use h3o::{CellIndex, LatLng, Resolution};
use thiserror::Error;

/// Finest resolution supported by the H3 grid.
pub const MAX_RESOLUTION: u8 = 15;

/// Why a single coordinate could not be assigned to a cell.
///
/// The aggregation loop treats every variant as "skip this pixel".
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    /// Coordinate outside the valid lat/lon domain (or not finite).
    #[error("invalid coordinate lat={lat}, lon={lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },

    /// Resolution not supported by the grid.
    #[error("unsupported resolution {0}")]
    UnsupportedResolution(u8),
}

/// Maps geographic coordinates to hexagonal cell identifiers.
pub trait HexIndexer: Sync {
    /// Resolution this indexer assigns cells at.
    fn resolution(&self) -> u8;

    /// Cell containing (lat, lon) in degrees.
    fn cell_for(&self, lat: f64, lon: f64) -> Result<CellIndex, ConversionError>;
}

/// H3 implementation of [`HexIndexer`] at a fixed resolution.
#[derive(Debug, Clone, Copy)]
pub struct H3Indexer {
    resolution: Resolution,
}

impl H3Indexer {
    /// Create an indexer for `resolution` (0-15).
    pub fn new(resolution: u8) -> Result<Self, ConversionError> {
        let resolution = Resolution::try_from(resolution)
            .map_err(|_| ConversionError::UnsupportedResolution(resolution))?;
        Ok(Self { resolution })
    }
}

impl HexIndexer for H3Indexer {
    fn resolution(&self) -> u8 {
        u8::from(self.resolution)
    }

    #[inline]
    fn cell_for(&self, lat: f64, lon: f64) -> Result<CellIndex, ConversionError> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(ConversionError::InvalidCoordinate { lat, lon });
        }

        let coord =
            LatLng::new(lat, lon).map_err(|_| ConversionError::InvalidCoordinate { lat, lon })?;
        Ok(coord.to_cell(self.resolution))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexer_resolution() {
        let indexer = H3Indexer::new(5).unwrap();
        assert_eq!(indexer.resolution(), 5);
        assert_eq!(
            H3Indexer::new(16).unwrap_err(),
            ConversionError::UnsupportedResolution(16)
        );
    }

    #[test]
    fn test_cell_for_matches_h3o() {
        let indexer = H3Indexer::new(7).unwrap();
        let cell = indexer.cell_for(45.5, -122.6).unwrap();

        let expected = LatLng::new(45.5, -122.6)
            .unwrap()
            .to_cell(Resolution::Seven);
        assert_eq!(cell, expected);
        assert_eq!(u8::from(cell.resolution()), 7);
    }

    #[test]
    fn test_cell_for_rejects_invalid_coordinates() {
        let indexer = H3Indexer::new(4).unwrap();
        assert!(matches!(
            indexer.cell_for(f64::NAN, 0.0),
            Err(ConversionError::InvalidCoordinate { .. })
        ));
        assert!(indexer.cell_for(95.0, 0.0).is_err());
        assert!(indexer.cell_for(0.0, -200.0).is_err());
        assert!(indexer.cell_for(f64::INFINITY, 0.0).is_err());
    }

    #[test]
    fn test_nearby_points_share_coarse_cell() {
        let indexer = H3Indexer::new(4).unwrap();
        let cell = indexer.cell_for(45.5, -122.6).unwrap();
        let center = LatLng::from(cell);

        // ~30 m from the center, far inside a resolution 4 cell (~22 km edge)
        let b = indexer
            .cell_for(center.lat() + 0.00025, center.lng() + 0.00025)
            .unwrap();
        assert_eq!(cell, b);
    }
}
