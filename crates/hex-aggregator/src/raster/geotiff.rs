//! Single-band GeoTIFF raster source built on the pure-Rust `tiff` decoder.
//!
//! Georeferencing comes from the ModelPixelScale + ModelTiepoint tags, or
//! from ModelTransformation when present. Windowed reads only decode the
//! strips or tiles that intersect the window, so a sub-region of a large
//! tile never requires decoding the whole image.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use forest_common::{GeoTransform, PixelWindow};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tiff::ColorType;
use tracing::debug;

use crate::error::{AggregationError, Result};
use crate::raster::RasterSource;

// GeoTIFF tag ids
const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;

/// A GeoTIFF opened for windowed reading.
pub struct GeoTiffSource<R: Read + Seek = BufReader<File>> {
    decoder: Decoder<R>,
    width: usize,
    height: usize,
    transform: GeoTransform,
    chunk_width: usize,
    chunk_height: usize,
    label: String,
}

impl GeoTiffSource<BufReader<File>> {
    /// Open a GeoTIFF file from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            AggregationError::open_failed(format!("{}: {}", path.display(), e))
        })?;
        Self::from_reader(BufReader::new(file), path.display().to_string())
    }
}

impl<R: Read + Seek> GeoTiffSource<R> {
    /// Open a GeoTIFF from any seekable reader. `label` names the source in
    /// error messages and logs.
    pub fn from_reader(reader: R, label: impl Into<String>) -> Result<Self> {
        let label = label.into();
        let mut decoder = Decoder::new(reader)
            .map_err(|e| AggregationError::open_failed(format!("{}: {}", label, e)))?
            .with_limits(Limits::unlimited());

        let colortype = decoder.colortype()?;
        if !matches!(colortype, ColorType::Gray(8) | ColorType::Gray(16)) {
            return Err(AggregationError::UnsupportedRaster(format!(
                "{}: expected a single 8 or 16 bit band, found {:?}",
                label, colortype
            )));
        }

        let (width, height) = decoder.dimensions()?;
        let transform = read_transform(&mut decoder)?;
        let (chunk_width, chunk_height) = decoder.chunk_dimensions();

        debug!(
            source = %label,
            width,
            height,
            chunk_width,
            chunk_height,
            "Opened GeoTIFF"
        );

        Ok(Self {
            decoder,
            width: width as usize,
            height: height as usize,
            transform,
            chunk_width: chunk_width as usize,
            chunk_height: chunk_height as usize,
            label,
        })
    }

    /// Number of chunks (strips or tiles) per chunk row.
    fn chunks_across(&self) -> usize {
        (self.width + self.chunk_width - 1) / self.chunk_width
    }
}

impl<R: Read + Seek> RasterSource for GeoTiffSource<R> {
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
                format!("{} ({}x{})", self.label, self.width, self.height),
            ));
        }

        let mut out = vec![0u8; window.len()];
        if window.is_empty() {
            return Ok(out);
        }

        let first_chunk_row = window.row_off / self.chunk_height;
        let last_chunk_row = (window.row_end() - 1) / self.chunk_height;
        let first_chunk_col = window.col_off / self.chunk_width;
        let last_chunk_col = (window.col_end() - 1) / self.chunk_width;
        let chunks_across = self.chunks_across();

        for chunk_row in first_chunk_row..=last_chunk_row {
            for chunk_col in first_chunk_col..=last_chunk_col {
                let index = chunk_row * chunks_across + chunk_col;
                let values = to_u8(self.decoder.read_chunk(index as u32)?)?;

                let row0 = chunk_row * self.chunk_height;
                let col0 = chunk_col * self.chunk_width;
                let data_width = self.chunk_width.min(self.width - col0);
                let data_height = self.chunk_height.min(self.height - row0);

                // Edge tiles may come back padded to the full tile size
                let stride = if values.len() == data_width * data_height {
                    data_width
                } else if values.len() == self.chunk_width * self.chunk_height {
                    self.chunk_width
                } else {
                    return Err(AggregationError::read_failed(format!(
                        "{}: chunk {} has {} values, expected {}x{}",
                        self.label,
                        index,
                        values.len(),
                        data_width,
                        data_height
                    )));
                };

                let row_start = window.row_off.max(row0);
                let row_end = window.row_end().min(row0 + data_height);
                let col_start = window.col_off.max(col0);
                let col_end = window.col_end().min(col0 + data_width);
                let span = col_end - col_start;

                for row in row_start..row_end {
                    let src = (row - row0) * stride + (col_start - col0);
                    let dst = (row - window.row_off) * window.width + (col_start - window.col_off);
                    out[dst..dst + span].copy_from_slice(&values[src..src + span]);
                }
            }
        }

        Ok(out)
    }
}

/// Convert decoded samples to `u8`. 16-bit values saturate at 255, which
/// lies outside every valid lossyear code either way.
fn to_u8(result: DecodingResult) -> Result<Vec<u8>> {
    match result {
        DecodingResult::U8(values) => Ok(values),
        DecodingResult::U16(values) => Ok(values
            .into_iter()
            .map(|v| v.min(u8::MAX as u16) as u8)
            .collect()),
        _ => Err(AggregationError::UnsupportedRaster(
            "only unsigned 8 and 16 bit samples are supported".to_string(),
        )),
    }
}

/// Build the affine transform from GeoTIFF model tags.
fn read_transform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<GeoTransform> {
    if let Some(matrix) = find_f64_tag(decoder, MODEL_TRANSFORMATION)? {
        if matrix.len() < 8 {
            return Err(AggregationError::InvalidGeoreference(format!(
                "ModelTransformation has {} values, expected 16",
                matrix.len()
            )));
        }
        return Ok(GeoTransform::from_gdal([
            matrix[3], matrix[0], matrix[1], matrix[7], matrix[4], matrix[5],
        ]));
    }

    let scale = find_f64_tag(decoder, MODEL_PIXEL_SCALE)?.ok_or_else(|| {
        AggregationError::InvalidGeoreference("missing ModelPixelScale tag".to_string())
    })?;
    let tiepoint = find_f64_tag(decoder, MODEL_TIEPOINT)?.ok_or_else(|| {
        AggregationError::InvalidGeoreference("missing ModelTiepoint tag".to_string())
    })?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(AggregationError::InvalidGeoreference(format!(
            "malformed scale ({} values) or tiepoint ({} values)",
            scale.len(),
            tiepoint.len()
        )));
    }

    let (scale_x, scale_y) = (scale[0], scale[1]);
    if scale_x <= 0.0 || scale_y <= 0.0 {
        return Err(AggregationError::InvalidGeoreference(format!(
            "non-positive pixel scale ({}, {})",
            scale_x, scale_y
        )));
    }

    // Tiepoint maps raster (i, j) to model (x, y)
    let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
    Ok(GeoTransform::north_up(
        x - i * scale_x,
        y + j * scale_y,
        scale_x,
        -scale_y,
    ))
}

fn find_f64_tag<R: Read + Seek>(decoder: &mut Decoder<R>, id: u16) -> Result<Option<Vec<f64>>> {
    let tag = Tag::from_u16_exhaustive(id);
    match decoder.find_tag(tag)? {
        Some(value) => Ok(Some(value.into_f64_vec().map_err(|e| {
            AggregationError::InvalidGeoreference(format!("tag {}: {}", id, e))
        })?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_u8_saturates() {
        let values = to_u8(DecodingResult::U16(vec![0, 23, 24, 300])).unwrap();
        assert_eq!(values, vec![0, 23, 24, 255]);
        assert!(to_u8(DecodingResult::F32(vec![1.0])).is_err());
    }

    #[test]
    fn test_open_rejects_non_tiff() {
        let reader = std::io::Cursor::new(b"not a tiff".to_vec());
        assert!(matches!(
            GeoTiffSource::from_reader(reader, "garbage"),
            Err(AggregationError::OpenFailed(_))
        ));
    }

    #[test]
    fn test_open_missing_file() {
        let result = GeoTiffSource::open("/nonexistent/lossyear.tif");
        assert!(matches!(result, Err(AggregationError::OpenFailed(_))));
    }
}
