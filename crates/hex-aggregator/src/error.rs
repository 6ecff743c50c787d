//! Error types for raster extraction and hexagon aggregation.

use thiserror::Error;

use forest_common::GeoError;

/// Errors that abort an extraction or an aggregation pass.
///
/// Per-pixel failures never surface here; see
/// [`ConversionError`](crate::hexgrid::ConversionError).
#[derive(Error, Debug)]
pub enum AggregationError {
    /// Failed to open the raster source.
    #[error("failed to open raster: {0}")]
    OpenFailed(String),

    /// Failed to read data from the raster.
    #[error("failed to read raster data: {0}")]
    ReadFailed(String),

    /// The raster is valid TIFF but not something we can aggregate.
    #[error("unsupported raster: {0}")]
    UnsupportedRaster(String),

    /// Required georeferencing tags are missing or malformed.
    #[error("invalid georeferencing: {0}")]
    InvalidGeoreference(String),

    /// The requested window does not fit inside the raster.
    #[error("requested window {requested} is outside raster of {raster}")]
    OutOfBounds { requested: String, raster: String },

    /// Configuration error, caught before any sweep starts.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Resolution outside the supported hexagon grid range.
    #[error("unsupported resolution {0}: expected 0-15")]
    UnsupportedResolution(u8),

    /// Geographic primitive error (bounds, transforms).
    #[error(transparent)]
    Geo(#[from] GeoError),

    /// Failed to write an output document.
    #[error("failed to write output: {0}")]
    OutputFailed(String),
}

impl AggregationError {
    /// Create an OpenFailed error.
    pub fn open_failed(msg: impl Into<String>) -> Self {
        Self::OpenFailed(msg.into())
    }

    /// Create a ReadFailed error.
    pub fn read_failed(msg: impl Into<String>) -> Self {
        Self::ReadFailed(msg.into())
    }

    /// Create an OutOfBounds error.
    pub fn out_of_bounds(requested: impl Into<String>, raster: impl Into<String>) -> Self {
        Self::OutOfBounds {
            requested: requested.into(),
            raster: raster.into(),
        }
    }

    /// Create a ConfigError.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}

/// Bare I/O errors come from writing documents; read paths map to
/// `ReadFailed` themselves.
impl From<std::io::Error> for AggregationError {
    fn from(err: std::io::Error) -> Self {
        Self::OutputFailed(err.to_string())
    }
}

impl From<serde_json::Error> for AggregationError {
    fn from(err: serde_json::Error) -> Self {
        Self::OutputFailed(err.to_string())
    }
}

impl From<tiff::TiffError> for AggregationError {
    fn from(err: tiff::TiffError) -> Self {
        Self::ReadFailed(err.to_string())
    }
}

/// Result type for aggregation operations.
pub type Result<T> = std::result::Result<T, AggregationError>;
