//! Synthetic single-band GeoTIFF writer.
//!
//! Produces small lossyear tiles georeferenced the same way the Hansen
//! tiles are: ModelPixelScale plus a ModelTiepoint anchoring pixel (0, 0)
//! at the top-left corner, geographic WGS84 keys.
//!
//! Striped tiles go through the `tiff` encoder. The encoder cannot write
//! tiled images, so tiled tiles are laid out by hand as little-endian
//! classic TIFF.

use std::fs::File;
use std::io::{self, BufWriter, Cursor, Seek, Write};
use std::path::Path;

use tiff::encoder::colortype::{Gray16, Gray8};
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind};
use tiff::tags::Tag;
use tiff::TiffResult;

use crate::fixtures::raster::RasterSpec;

// GeoTIFF tag ids
const GEOTIFF_MODELPIXELSCALE: u16 = 33550;
const GEOTIFF_MODELTIEPOINT: u16 = 33922;
const GEOTIFF_GEOKEYDIRECTORY: u16 = 34735;

// Geographic model, pixel-is-area, WGS84
const GEOKEYS: [u16; 16] = [
    1, 1, 0, 3, //
    1024, 0, 1, 2, //
    1025, 0, 1, 1, //
    2048, 0, 1, 4326,
];

/// Everything needed to write one synthetic tile.
#[derive(Debug, Clone)]
pub struct LossyearTiff<'a> {
    pub spec: RasterSpec,
    /// Row-major pixel values, `spec.width * spec.height` long.
    pub data: &'a [u8],
    /// Rows per strip; `None` writes the encoder's default strip layout.
    pub rows_per_strip: Option<u32>,
    /// Store samples as 16-bit instead of 8-bit.
    pub sixteen_bit: bool,
    /// Square tile size; `Some` writes a tiled image instead of strips.
    pub tile_size: Option<u32>,
}

impl<'a> LossyearTiff<'a> {
    /// 8-bit tile with default strips.
    pub fn new(spec: RasterSpec, data: &'a [u8]) -> Self {
        Self {
            spec,
            data,
            rows_per_strip: None,
            sixteen_bit: false,
            tile_size: None,
        }
    }

    /// Set the strip height.
    pub fn with_rows_per_strip(mut self, rows: u32) -> Self {
        self.rows_per_strip = Some(rows);
        self
    }

    /// Store as 16-bit samples.
    pub fn sixteen_bit(mut self) -> Self {
        self.sixteen_bit = true;
        self
    }

    /// Write square tiles of `size` pixels. TIFF requires a multiple of 16.
    pub fn with_tiles(mut self, size: u32) -> Self {
        self.tile_size = Some(size);
        self
    }
}

/// Write a synthetic tile to `path`.
pub fn write_lossyear_geotiff(path: &Path, tile: &LossyearTiff<'_>) -> TiffResult<()> {
    let writer = BufWriter::new(File::create(path)?);
    write_lossyear_geotiff_to(writer, tile)
}

/// Encode a synthetic tile into memory.
pub fn lossyear_geotiff_bytes(tile: &LossyearTiff<'_>) -> TiffResult<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    write_lossyear_geotiff_to(&mut cursor, tile)?;
    Ok(cursor.into_inner())
}

/// Write a synthetic tile to any seekable writer.
pub fn write_lossyear_geotiff_to<W: Write + Seek>(
    writer: W,
    tile: &LossyearTiff<'_>,
) -> TiffResult<()> {
    if let Some(size) = tile.tile_size {
        return write_tiled_to(writer, tile, size);
    }

    let width = tile.spec.width as u32;
    let height = tile.spec.height as u32;
    let mut encoder = TiffEncoder::new(writer)?;

    if tile.sixteen_bit {
        let widened: Vec<u16> = tile.data.iter().map(|&v| v as u16).collect();
        let mut image = encoder.new_image::<Gray16>(width, height)?;
        if let Some(rows) = tile.rows_per_strip {
            image.rows_per_strip(rows)?;
        }
        write_geotiff_tags(image.encoder(), &tile.spec)?;
        image.write_data(&widened)?;
    } else {
        let mut image = encoder.new_image::<Gray8>(width, height)?;
        if let Some(rows) = tile.rows_per_strip {
            image.rows_per_strip(rows)?;
        }
        write_geotiff_tags(image.encoder(), &tile.spec)?;
        image.write_data(tile.data)?;
    }

    Ok(())
}

fn write_geotiff_tags<W: Write + Seek, K: TiffKind>(
    dir: &mut DirectoryEncoder<'_, W, K>,
    spec: &RasterSpec,
) -> TiffResult<()> {
    dir.write_tag(Tag::Unknown(GEOTIFF_MODELPIXELSCALE), pixel_scale(spec).as_slice())?;
    dir.write_tag(Tag::Unknown(GEOTIFF_MODELTIEPOINT), tiepoint(spec).as_slice())?;
    dir.write_tag(Tag::Unknown(GEOTIFF_GEOKEYDIRECTORY), GEOKEYS.as_slice())?;
    Ok(())
}

/// ModelPixelScale: [ScaleX, ScaleY, ScaleZ]
fn pixel_scale(spec: &RasterSpec) -> [f64; 3] {
    [spec.pixel_size, spec.pixel_size, 0.0]
}

/// ModelTiepoint: pixel (0, 0) -> (origin_lon, origin_lat)
fn tiepoint(spec: &RasterSpec) -> [f64; 6] {
    [0.0, 0.0, 0.0, spec.origin_lon, spec.origin_lat, 0.0]
}

/// IFD field payload.
enum Field {
    Short(Vec<u16>),
    Long(Vec<u32>),
    Double(Vec<f64>),
}

impl Field {
    /// (TIFF type code, value count, little-endian bytes)
    fn encode(&self) -> (u16, u32, Vec<u8>) {
        match self {
            Field::Short(v) => (3, v.len() as u32, v.iter().flat_map(|x| x.to_le_bytes()).collect()),
            Field::Long(v) => (4, v.len() as u32, v.iter().flat_map(|x| x.to_le_bytes()).collect()),
            Field::Double(v) => (12, v.len() as u32, v.iter().flat_map(|x| x.to_le_bytes()).collect()),
        }
    }
}

/// Layout: header, IFD, tile data, then out-of-line field values.
fn write_tiled_to<W: Write>(mut writer: W, tile: &LossyearTiff<'_>, tile_size: u32) -> TiffResult<()> {
    if tile_size == 0 || tile_size % 16 != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("tile size {} is not a positive multiple of 16", tile_size),
        )
        .into());
    }

    let spec = &tile.spec;
    let size = tile_size as usize;
    let sample_bytes = if tile.sixteen_bit { 2 } else { 1 };
    let tiles_across = (spec.width + size - 1) / size;
    let tiles_down = (spec.height + size - 1) / size;
    let tile_bytes = size * size * sample_bytes;

    let mut tile_data = Vec::with_capacity(tiles_across * tiles_down * tile_bytes);
    for tile_row in 0..tiles_down {
        for tile_col in 0..tiles_across {
            for r in 0..size {
                for c in 0..size {
                    let (row, col) = (tile_row * size + r, tile_col * size + c);
                    // Edge tiles are padded to full size with zeros
                    let value = if row < spec.height && col < spec.width {
                        tile.data[row * spec.width + col]
                    } else {
                        0
                    };
                    if tile.sixteen_bit {
                        tile_data.extend_from_slice(&(value as u16).to_le_bytes());
                    } else {
                        tile_data.push(value);
                    }
                }
            }
        }
    }

    // Tags in ascending order
    let mut fields = vec![
        (256u16, Field::Long(vec![spec.width as u32])),
        (257, Field::Long(vec![spec.height as u32])),
        (258, Field::Short(vec![8 * sample_bytes as u16])),
        (259, Field::Short(vec![1])),
        (262, Field::Short(vec![1])),
        (277, Field::Short(vec![1])),
        (284, Field::Short(vec![1])),
        (322, Field::Long(vec![tile_size])),
        (323, Field::Long(vec![tile_size])),
        (324, Field::Long(Vec::new())),
        (325, Field::Long(vec![tile_bytes as u32; tiles_across * tiles_down])),
        (339, Field::Short(vec![1])),
        (GEOTIFF_MODELPIXELSCALE, Field::Double(pixel_scale(spec).to_vec())),
        (GEOTIFF_MODELTIEPOINT, Field::Double(tiepoint(spec).to_vec())),
        (GEOTIFF_GEOKEYDIRECTORY, Field::Short(GEOKEYS.to_vec())),
    ];

    let tiles_start = 8 + 2 + fields.len() * 12 + 4;
    let offsets = (0..tiles_across * tiles_down)
        .map(|i| (tiles_start + i * tile_bytes) as u32)
        .collect();
    if let Some(entry) = fields.iter_mut().find(|entry| entry.0 == 324) {
        entry.1 = Field::Long(offsets);
    }

    let extra_start = tiles_start + tile_data.len();
    let mut ifd = Vec::new();
    let mut extra = Vec::new();
    ifd.extend_from_slice(&(fields.len() as u16).to_le_bytes());
    for (tag, field) in &fields {
        let (kind, count, bytes) = field.encode();
        ifd.extend_from_slice(&tag.to_le_bytes());
        ifd.extend_from_slice(&kind.to_le_bytes());
        ifd.extend_from_slice(&count.to_le_bytes());
        if bytes.len() <= 4 {
            let mut inline = [0u8; 4];
            inline[..bytes.len()].copy_from_slice(&bytes);
            ifd.extend_from_slice(&inline);
        } else {
            ifd.extend_from_slice(&((extra_start + extra.len()) as u32).to_le_bytes());
            extra.extend_from_slice(&bytes);
            // Keep values word aligned
            if extra.len() % 2 == 1 {
                extra.push(0);
            }
        }
    }
    // No further IFDs
    ifd.extend_from_slice(&0u32.to_le_bytes());

    writer.write_all(b"II")?;
    writer.write_all(&42u16.to_le_bytes())?;
    writer.write_all(&8u32.to_le_bytes())?;
    writer.write_all(&ifd)?;
    writer.write_all(&tile_data)?;
    writer.write_all(&extra)?;
    writer.flush()?;

    Ok(())
}
