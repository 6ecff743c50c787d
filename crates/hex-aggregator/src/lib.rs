//! Forest-loss hexagon aggregation.
//!
//! This crate turns a Hansen lossyear raster into per-hexagon loss totals:
//!
//! - **Windowed extraction**: only the pixels inside the configured bounds
//!   are decoded from the source raster
//! - **Sub-sampled sweep**: every `sample_rate`-th pixel is visited and
//!   weighted by `sample_rate²`
//! - **Per-year breakdown**: each H3 cell keeps a total plus a count per
//!   lossyear code
//!
//! # Architecture
//!
//! ```text
//! GeoTIFF tile
//!      │
//!      ▼
//! extract_window(source, bounds)
//!      │
//!      ├─► Bounds → pixel window (floor/ceil, clipped)
//!      │
//!      └─► Decode intersecting strips/tiles → RasterWindow
//!               │
//!               ▼
//!     aggregate(window, resolution, sample_rate)   (once per resolution)
//!               │
//!               ├─► Skip 0 and codes > 23
//!               │
//!               ├─► Pixel center → H3 cell (errors skip the pixel)
//!               │
//!               └─► cell.total_loss += k², cell.by_year[code] += k²
//!                        │
//!                        ▼
//!               ForestLossDocument → {prefix}-res{N}.json
//! ```
//!
//! # Example
//!
//! ```ignore
//! use hex_aggregator::{aggregate, extract_window, GeoTiffSource, ForestLossDocument};
//!
//! let mut source = GeoTiffSource::open(".cache/lossyear_50N_130W.tif")?;
//! let window = extract_window(&mut source, &bounds)?;
//!
//! for resolution in [4, 5, 6, 7] {
//!     let result = aggregate(&window, resolution, 10)?;
//!     let doc = ForestLossDocument::from_result(&result, &bounds, "Hansen GFC 2023 v1.11");
//!     write_document(Path::new("public/data"), "forest-loss", &doc)?;
//! }
//! ```

pub mod aggregate;
pub mod config;
pub mod error;
pub mod hexgrid;
pub mod output;
pub mod raster;
pub mod types;

// Re-export commonly used types at crate root
pub use aggregate::{aggregate, aggregate_with, CellAccumulator, HexAggregator, SweepMode};
pub use config::{parse_resolution_list, AggregationConfig};
pub use error::{AggregationError, Result};
pub use hexgrid::{ConversionError, H3Indexer, HexIndexer, MAX_RESOLUTION};
pub use output::{
    cell_to_hex, document_file_name, read_document, write_document, CellEntry,
    ForestLossDocument,
};
pub use raster::{extract_window, GeoTiffSource, InMemoryRaster, RasterSource, RasterWindow};
pub use types::{
    AggregationResult, AggregationStats, HexCellRecord, PixelClass, LOSS_YEAR_BASE,
    MAX_LOSS_CODE, MIN_LOSS_CODE,
};

pub use forest_common::{GeoBounds, GeoTransform, PixelWindow};
