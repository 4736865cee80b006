//! Density buckets for the admin heatmap.
//!
//! A report's bucket is the geohash prefix of its location, so each report
//! lands in exactly one cell and re-aggregation is deterministic.

use std::collections::BTreeMap;

use serde::Serialize;

use civicpulse_common::Report;

use crate::error::StoreError;
use crate::geo_index::{geohash_key, INDEX_PRECISION};

pub const DEFAULT_HEATMAP_PRECISION: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapCell {
    pub cell: String,
    pub count: u64,
    /// Centre of the cell.
    pub lat: f64,
    pub lng: f64,
}

pub fn clamp_precision(precision: usize) -> usize {
    precision.clamp(1, INDEX_PRECISION)
}

/// The bucket a report belongs to at `precision`.
pub fn cell_for(report: &Report, precision: usize) -> Result<String, StoreError> {
    geohash_key(&report.location, clamp_precision(precision))
}

/// Bucket reports and count per non-empty cell.
pub fn aggregate<'a, I>(reports: I, precision: usize) -> Result<Vec<HeatmapCell>, StoreError>
where
    I: IntoIterator<Item = &'a Report>,
{
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for report in reports {
        *counts.entry(cell_for(report, precision)?).or_insert(0) += 1;
    }
    Ok(cells_from_counts(counts))
}

/// Turn per-cell counts into heatmap rows, densest first, then by cell.
pub fn cells_from_counts(counts: BTreeMap<String, u64>) -> Vec<HeatmapCell> {
    let mut cells: Vec<HeatmapCell> = counts
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .filter_map(|(cell, count)| {
            let (center, _, _) = geohash::decode(&cell).ok()?;
            Some(HeatmapCell {
                cell,
                count,
                lat: center.y,
                lng: center.x,
            })
        })
        .collect();
    cells.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.cell.cmp(&b.cell)));
    cells
}
