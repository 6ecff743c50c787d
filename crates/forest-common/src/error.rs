//! Error types for geographic primitives.

use thiserror::Error;

/// Result type alias using GeoError.
pub type GeoResult<T> = Result<T, GeoError>;

/// Errors raised while validating bounds or working with transforms.
#[derive(Debug, Error)]
pub enum GeoError {
    #[error("Invalid bounds: {0}")]
    InvalidBounds(String),

    #[error("Invalid bounds format: {0}. Expected 'west,south,east,north'")]
    InvalidFormat(String),

    #[error("Invalid number in bounds: {0}")]
    InvalidNumber(String),

    #[error("Affine transform is not invertible")]
    NonInvertibleTransform,

    #[error("Rotated or sheared transforms are not supported")]
    RotatedTransform,

    #[error("Coordinate ({lon}, {lat}) cannot be mapped to pixel space")]
    UnmappableCoordinate { lon: f64, lat: f64 },
}

impl GeoError {
    /// Create an InvalidBounds error.
    pub fn invalid_bounds(msg: impl Into<String>) -> Self {
        Self::InvalidBounds(msg.into())
    }
}
