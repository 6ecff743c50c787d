//! Core types for hexagon aggregation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use h3o::CellIndex;
use serde::{Deserialize, Serialize};

/// Smallest valid lossyear code (loss detected in 2001).
pub const MIN_LOSS_CODE: u8 = 1;

/// Largest valid lossyear code in the GFC-2023 release (loss in 2023).
pub const MAX_LOSS_CODE: u8 = 23;

/// Base year the lossyear codes are offsets from.
pub const LOSS_YEAR_BASE: u16 = 2000;

/// Classification of a raw pixel value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelClass {
    /// No loss recorded.
    NoLoss,
    /// Value above the valid code range (nodata or a newer release).
    OutOfRange,
    /// Valid lossyear code.
    Loss(u8),
}

impl PixelClass {
    /// Classify a raw lossyear value.
    #[inline]
    pub fn of(value: u8) -> Self {
        match value {
            0 => Self::NoLoss,
            v if v > MAX_LOSS_CODE => Self::OutOfRange,
            v => Self::Loss(v),
        }
    }
}

/// Accumulated loss for one hexagonal cell.
///
/// `total_loss` always equals the sum of `by_year`. Keys of `by_year` are
/// raw lossyear codes (1-23), not calendar years.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HexCellRecord {
    pub total_loss: u64,
    pub by_year: BTreeMap<u8, u64>,
}

impl HexCellRecord {
    /// Add `weight` to both the total and the bucket for `code`.
    #[inline]
    pub fn add(&mut self, code: u8, weight: u64) {
        self.total_loss += weight;
        *self.by_year.entry(code).or_insert(0) += weight;
    }

    /// Fold another record for the same cell into this one.
    pub fn merge(&mut self, other: HexCellRecord) {
        self.total_loss += other.total_loss;
        for (code, weight) in other.by_year {
            *self.by_year.entry(code).or_insert(0) += weight;
        }
    }

    /// Sum of the per-year buckets.
    pub fn year_sum(&self) -> u64 {
        self.by_year.values().sum()
    }

    /// Calendar year for a lossyear code (e.g. 5 -> 2005).
    pub fn calendar_year(code: u8) -> u16 {
        LOSS_YEAR_BASE + code as u16
    }
}

/// Counters describing one aggregation pass.
///
/// `sampled == accepted + skipped_no_loss + skipped_out_of_range + skipped_conversion`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationStats {
    /// Sampled pixel positions visited.
    pub sampled: u64,
    /// Positions that contributed to a cell.
    pub accepted: u64,
    /// Positions with value 0.
    pub skipped_no_loss: u64,
    /// Positions with a value above the valid code range.
    pub skipped_out_of_range: u64,
    /// Positions whose coordinate could not be converted to a cell.
    pub skipped_conversion: u64,
}

impl AggregationStats {
    /// Combine counters from two disjoint sweeps.
    pub fn merge(&mut self, other: &AggregationStats) {
        self.sampled += other.sampled;
        self.accepted += other.accepted;
        self.skipped_no_loss += other.skipped_no_loss;
        self.skipped_out_of_range += other.skipped_out_of_range;
        self.skipped_conversion += other.skipped_conversion;
    }

    /// Total skipped positions, all reasons.
    pub fn skipped(&self) -> u64 {
        self.skipped_no_loss + self.skipped_out_of_range + self.skipped_conversion
    }
}

/// Finished result of one aggregation pass at one resolution.
#[derive(Debug, Clone)]
pub struct AggregationResult {
    /// Hexagon resolution the cells are indexed at.
    pub resolution: u8,
    /// Sub-sampling stride used.
    pub sample_rate: u32,
    /// Touched cells, ordered by cell index.
    pub cells: BTreeMap<CellIndex, HexCellRecord>,
    /// Pass counters.
    pub stats: AggregationStats,
    /// When the sweep completed.
    pub completed_at: DateTime<Utc>,
}

impl AggregationResult {
    /// Number of distinct cells with at least one contribution.
    pub fn total_cells(&self) -> usize {
        self.cells.len()
    }

    /// Sum of `total_loss` across all cells.
    pub fn total_loss(&self) -> u64 {
        self.cells.values().map(|record| record.total_loss).sum()
    }

    /// Check if no cell was touched.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Record for a cell, if it was touched.
    pub fn get(&self, cell: &CellIndex) -> Option<&HexCellRecord> {
        self.cells.get(cell)
    }
}
