//! Geohash-keyed spatial index over report locations.
//!
//! Entries are ordered by full-precision geohash, so every geohash cell is a
//! contiguous key range. Radius queries cover the circle's bounding box with
//! coarser cells and scan each cell's range; heatmap bucketing truncates keys.
//!
//! Entries are split into buckets by geohash prefix. Each bucket is an
//! `ArcSwap` snapshot: readers load it without locking, writers copy the one
//! bucket they touch under its mutex and publish the copy. The bucket
//! directory is itself a snapshot, rewritten only when a new bucket appears.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use uuid::Uuid;

use civicpulse_common::{BoundingBox, GeoPoint};

use crate::error::StoreError;

/// Geohash length stored per entry (~4.8m × 4.8m cells).
pub const INDEX_PRECISION: usize = 9;

/// Bucket prefix length (~1.2km × 0.6km cells).
const BUCKET_PRECISION: usize = 6;

/// Upper bound on cells used to cover a query box.
const MAX_COVER_CELLS: usize = 64;

/// Encode a point as a geohash of the given length.
pub fn geohash_key(point: &GeoPoint, precision: usize) -> Result<String, StoreError> {
    geohash::encode(
        geohash::Coord {
            x: point.lng(),
            y: point.lat(),
        },
        precision,
    )
    .map_err(|e| StoreError::InvalidArgument(format!("cannot geohash point: {e}")))
}

type Entries = BTreeMap<(String, Uuid), GeoPoint>;
type Directory = BTreeMap<String, Arc<Bucket>>;

#[derive(Default)]
struct Bucket {
    entries: ArcSwap<Entries>,
    write: Mutex<()>,
}

#[derive(Default)]
pub struct GeoIndex {
    buckets: ArcSwap<Directory>,
    grow: Mutex<()>,
}

impl GeoIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: Uuid, point: GeoPoint) -> Result<(), StoreError> {
        let key = geohash_key(&point, INDEX_PRECISION)?;
        let bucket = self.bucket(&key[..BUCKET_PRECISION]);

        let _guard = bucket.write.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = Entries::clone(&bucket.entries.load());
        entries.insert((key, id), point);
        bucket.entries.store(Arc::new(entries));
        Ok(())
    }

    /// The bucket for `prefix`, created on first use.
    fn bucket(&self, prefix: &str) -> Arc<Bucket> {
        if let Some(bucket) = self.buckets.load().get(prefix) {
            return Arc::clone(bucket);
        }

        let _guard = self.grow.lock().unwrap_or_else(|e| e.into_inner());
        let current = self.buckets.load_full();
        if let Some(bucket) = current.get(prefix) {
            return Arc::clone(bucket);
        }
        let bucket = Arc::new(Bucket::default());
        let mut next = Directory::clone(&current);
        next.insert(prefix.to_string(), Arc::clone(&bucket));
        self.buckets.store(Arc::new(next));
        bucket
    }

    pub fn len(&self) -> usize {
        self.buckets
            .load()
            .values()
            .map(|bucket| bucket.entries.load().len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every indexed point inside `bbox`. Callers apply the exact distance test.
    pub fn within(&self, bbox: &BoundingBox) -> Vec<(Uuid, GeoPoint)> {
        let buckets = self.buckets.load();

        let mut hits = Vec::new();
        for cell in covering_cells(bbox) {
            for bucket in buckets_under(&buckets, &cell) {
                let entries = bucket.entries.load();
                let start = (cell.clone(), Uuid::nil());
                for ((key, id), point) in entries.range(start..) {
                    if !key.starts_with(&cell) {
                        break;
                    }
                    if bbox.contains(point) {
                        hits.push((*id, *point));
                    }
                }
            }
        }
        hits
    }

    /// Count of indexed points per geohash prefix of length `precision`.
    pub fn cell_counts(&self, precision: usize) -> BTreeMap<String, u64> {
        let precision = precision.clamp(1, INDEX_PRECISION);
        let buckets = self.buckets.load();

        let mut counts = BTreeMap::new();
        for bucket in buckets.values() {
            for (key, _) in bucket.entries.load().keys() {
                *counts.entry(key[..precision].to_string()).or_insert(0) += 1;
            }
        }
        counts
    }
}

/// Buckets that can hold keys starting with `cell`.
fn buckets_under<'a>(buckets: &'a Directory, cell: &str) -> Vec<&'a Arc<Bucket>> {
    if cell.len() >= BUCKET_PRECISION {
        return buckets.get(&cell[..BUCKET_PRECISION]).into_iter().collect();
    }
    buckets
        .range(cell.to_string()..)
        .take_while(|(prefix, _)| prefix.starts_with(cell))
        .map(|(_, bucket)| bucket)
        .collect()
}

// --- Cell covering ---

/// Cell width and height in degrees for a geohash of length `precision`.
fn cell_size(precision: usize) -> (f64, f64) {
    let bits = 5 * precision as i32;
    let lng_bits = (bits + 1) / 2;
    let lat_bits = bits / 2;
    (360.0 / 2f64.powi(lng_bits), 180.0 / 2f64.powi(lat_bits))
}

fn cell_index(value: f64, origin: f64, size: f64, count: usize) -> usize {
    let raw = ((value - origin) / size).floor();
    (raw.max(0.0) as usize).min(count - 1)
}

/// Column ranges (one per longitude interval) and the row range covering `bbox`.
fn grid_span(bbox: &BoundingBox, precision: usize) -> (Vec<(usize, usize)>, (usize, usize)) {
    let (width, height) = cell_size(precision);
    let cols = (360.0 / width).round() as usize;
    let rows = (180.0 / height).round() as usize;

    let col_ranges = bbox
        .lng_ranges()
        .into_iter()
        .map(|(lo, hi)| {
            (
                cell_index(lo, -180.0, width, cols),
                cell_index(hi, -180.0, width, cols),
            )
        })
        .collect();
    let row_range = (
        cell_index(bbox.min_lat, -90.0, height, rows),
        cell_index(bbox.max_lat, -90.0, height, rows),
    );
    (col_ranges, row_range)
}

fn span_len(col_ranges: &[(usize, usize)], rows: (usize, usize)) -> usize {
    let cols: usize = col_ranges.iter().map(|(lo, hi)| hi - lo + 1).sum();
    cols * (rows.1 - rows.0 + 1)
}

/// Geohash cells that together cover `bbox`, at the finest precision that
/// keeps the cell count under [`MAX_COVER_CELLS`].
pub(crate) fn covering_cells(bbox: &BoundingBox) -> Vec<String> {
    // Precision 1 is an 8×4 grid, always under the cap.
    let precision = (1..=INDEX_PRECISION)
        .rev()
        .find(|p| {
            let (cols, rows) = grid_span(bbox, *p);
            span_len(&cols, rows) <= MAX_COVER_CELLS
        })
        .unwrap_or(1);

    let (width, height) = cell_size(precision);
    let (col_ranges, (row_lo, row_hi)) = grid_span(bbox, precision);

    let mut cells = Vec::new();
    for (col_lo, col_hi) in col_ranges {
        for col in col_lo..=col_hi {
            for row in row_lo..=row_hi {
                let lng = -180.0 + (col as f64 + 0.5) * width;
                let lat = -90.0 + (row as f64 + 0.5) * height;
                if let Ok(hash) = geohash::encode(geohash::Coord { x: lng, y: lat }, precision) {
                    cells.push(hash);
                }
            }
        }
    }
    cells.sort();
    cells.dedup();
    cells
}
