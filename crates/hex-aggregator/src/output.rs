//! Per-resolution output documents.
//!
//! Each aggregation pass becomes one JSON document named
//! `{prefix}-res{N}.json`. Documents are written to a `.partial` sibling
//! first and renamed into place, so readers never observe a half-written
//! file.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use h3o::CellIndex;
use serde::{Deserialize, Serialize};
use tracing::info;

use forest_common::GeoBounds;

use crate::error::{AggregationError, Result};
use crate::types::AggregationResult;

/// One cell of an output document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellEntry {
    /// Lowercase hexadecimal H3 index.
    pub h3: String,
    pub total_loss: u64,
    /// Raw lossyear code to weighted count.
    pub by_year: BTreeMap<u8, u64>,
}

/// The document written for one resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForestLossDocument {
    pub generated: DateTime<Utc>,
    pub source: String,
    pub resolution: u8,
    pub bounds: GeoBounds,
    pub sample_rate: u32,
    pub total_cells: usize,
    pub cells: Vec<CellEntry>,
}

impl ForestLossDocument {
    /// Build a document from a finished pass.
    pub fn from_result(
        result: &AggregationResult,
        bounds: &GeoBounds,
        source: impl Into<String>,
    ) -> Self {
        let cells: Vec<CellEntry> = result
            .cells
            .iter()
            .map(|(cell, record)| CellEntry {
                h3: cell_to_hex(*cell),
                total_loss: record.total_loss,
                by_year: record.by_year.clone(),
            })
            .collect();

        Self {
            generated: result.completed_at,
            source: source.into(),
            resolution: result.resolution,
            bounds: *bounds,
            sample_rate: result.sample_rate,
            total_cells: cells.len(),
            cells,
        }
    }

    /// Sum of `totalLoss` over all cells.
    pub fn total_loss(&self) -> u64 {
        self.cells.iter().map(|c| c.total_loss).sum()
    }
}

/// Lowercase hexadecimal form of a cell index.
pub fn cell_to_hex(cell: CellIndex) -> String {
    format!("{:x}", u64::from(cell))
}

/// File name used for a resolution, e.g. `forest-loss-res5.json`.
pub fn document_file_name(prefix: &str, resolution: u8) -> String {
    format!("{}-res{}.json", prefix, resolution)
}

/// Write `doc` into `dir`, creating the directory if needed. Returns the
/// final path.
pub fn write_document(dir: &Path, prefix: &str, doc: &ForestLossDocument) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(|e| {
        AggregationError::OutputFailed(format!("create {}: {}", dir.display(), e))
    })?;

    let path = dir.join(document_file_name(prefix, doc.resolution));
    let partial = path.with_extension("json.partial");

    let write = || -> Result<()> {
        let file = File::create(&partial)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, doc)?;
        writer.write_all(b"\n")?;
        let file = writer
            .into_inner()
            .map_err(|e| AggregationError::OutputFailed(e.to_string()))?;
        file.sync_all()?;
        Ok(())
    };

    if let Err(e) = write() {
        let _ = fs::remove_file(&partial);
        return Err(e);
    }

    fs::rename(&partial, &path).map_err(|e| {
        let _ = fs::remove_file(&partial);
        AggregationError::OutputFailed(format!("rename to {}: {}", path.display(), e))
    })?;

    info!(
        path = %path.display(),
        resolution = doc.resolution,
        cells = doc.total_cells,
        "Wrote output document"
    );

    Ok(path)
}

/// Read a document back from disk.
pub fn read_document(path: &Path) -> Result<ForestLossDocument> {
    let bytes = fs::read(path)
        .map_err(|e| AggregationError::read_failed(format!("{}: {}", path.display(), e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AggregationError::read_failed(format!("{}: {}", path.display(), e)))
}
