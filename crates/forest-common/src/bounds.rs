//! Geographic bounding boxes expressed as north/south/east/west edges.

use serde::{Deserialize, Serialize};

use crate::error::{GeoError, GeoResult};

/// A geographic bounding box in WGS84 degrees.
///
/// Antimeridian crossings are not supported: `east` must be greater than
/// `west` and `north` greater than `south`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl GeoBounds {
    /// Create bounds from their four edges.
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }

    /// Parse a comma separated `west,south,east,north` string, the same
    /// axis order used by WMS BBOX parameters.
    pub fn from_bbox_string(s: &str) -> GeoResult<Self> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(GeoError::InvalidFormat(s.to_string()));
        }

        let parse = |v: &str| -> GeoResult<f64> {
            v.parse()
                .map_err(|_| GeoError::InvalidNumber(v.to_string()))
        };

        Ok(Self {
            west: parse(parts[0])?,
            south: parse(parts[1])?,
            east: parse(parts[2])?,
            north: parse(parts[3])?,
        })
    }

    /// Check the edges are finite, ordered and inside the WGS84 domain.
    pub fn validate(&self) -> GeoResult<()> {
        let edges = [self.north, self.south, self.east, self.west];
        if edges.iter().any(|v| !v.is_finite()) {
            return Err(GeoError::invalid_bounds(format!(
                "non-finite edge in {:?}",
                self
            )));
        }

        if self.north <= self.south {
            return Err(GeoError::invalid_bounds(format!(
                "north ({}) must be greater than south ({})",
                self.north, self.south
            )));
        }

        if self.east <= self.west {
            return Err(GeoError::invalid_bounds(format!(
                "east ({}) must be greater than west ({})",
                self.east, self.west
            )));
        }

        if self.north > 90.0 || self.south < -90.0 {
            return Err(GeoError::invalid_bounds(format!(
                "latitude range [{}, {}] outside [-90, 90]",
                self.south, self.north
            )));
        }

        if self.east > 180.0 || self.west < -180.0 {
            return Err(GeoError::invalid_bounds(format!(
                "longitude range [{}, {}] outside [-180, 180]",
                self.west, self.east
            )));
        }

        Ok(())
    }

    /// Width in degrees of longitude.
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    /// Height in degrees of latitude.
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Check if a point is contained within these bounds (edges inclusive).
    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        lon >= self.west && lon <= self.east && lat >= self.south && lat <= self.north
    }

    /// Check if these bounds overlap another set of bounds.
    pub fn intersects(&self, other: &GeoBounds) -> bool {
        self.west < other.east
            && self.east > other.west
            && self.south < other.north
            && self.north > other.south
    }

    /// Compute the overlap of two bounds.
    pub fn intersection(&self, other: &GeoBounds) -> Option<GeoBounds> {
        if !self.intersects(other) {
            return None;
        }

        Some(GeoBounds {
            north: self.north.min(other.north),
            south: self.south.max(other.south),
            east: self.east.min(other.east),
            west: self.west.max(other.west),
        })
    }
}

impl std::fmt::Display for GeoBounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "N{} S{} E{} W{}",
            self.north, self.south, self.east, self.west
        )
    }
}
