//! Common geographic types shared across the forest-hex crates.

pub mod bounds;
pub mod error;
pub mod transform;

pub use bounds::GeoBounds;
pub use error::{GeoError, GeoResult};
pub use transform::{GeoTransform, PixelWindow};
