// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Grid indexer - maps coordinates onto fixed-resolution lat/lon buckets

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::GeoPoint;

/// Default grid resolution in degrees (~1.1 km at the equator)
pub const DEFAULT_RESOLUTION_DEG: f64 = 0.01;

/// Discrete grid cell, addressed by integer steps of the resolution.
///
/// Keeping integer indices rather than rounded floats makes the id a stable
/// hash key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridCellId {
    pub lat_idx: i64,
    pub lon_idx: i64,
}

impl fmt::Display for GridCellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.lat_idx, self.lon_idx)
    }
}

/// Pure coordinate -> cell mapping at a given resolution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridIndexer {
    resolution: f64,
}

impl Default for GridIndexer {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION_DEG,
        }
    }
}

impl GridIndexer {
    /// Returns `None` for a non-positive or non-finite resolution
    pub fn new(resolution: f64) -> Option<Self> {
        if resolution.is_finite() && resolution > 0.0 {
            Some(Self { resolution })
        } else {
            None
        }
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Cell containing a coordinate (nearest grid node)
    pub fn index(&self, point: &GeoPoint) -> GridCellId {
        GridCellId {
            lat_idx: (point.lat / self.resolution).round() as i64,
            lon_idx: (point.lon / self.resolution).round() as i64,
        }
    }

    /// Grid node at the centre of a cell
    pub fn center(&self, cell: GridCellId) -> GeoPoint {
        GeoPoint::new(
            cell.lat_idx as f64 * self.resolution,
            cell.lon_idx as f64 * self.resolution,
        )
    }

    /// Human-readable segment label, e.g. `28.61_77.21`
    pub fn label(&self, cell: GridCellId) -> String {
        let decimals = (-self.resolution.log10() - 1e-9).ceil().max(0.0) as usize;
        let c = self.center(cell);
        format!("{:.*}_{:.*}", decimals, c.lat, decimals, c.lon)
    }

    /// Cells visited by a straight line from `start` to `end`.
    ///
    /// The line is sampled once per resolution step along its longer axis;
    /// repeated cells are dropped while preserving visiting order.
    pub fn path_cells(&self, start: &GeoPoint, end: &GeoPoint) -> Vec<GridCellId> {
        let lat_steps = ((end.lat - start.lat).abs() / self.resolution) as usize;
        let lon_steps = ((end.lon - start.lon).abs() / self.resolution) as usize;
        let segments = lat_steps.max(lon_steps).max(1);

        let mut seen = HashSet::new();
        let mut cells = Vec::with_capacity(segments + 1);

        for i in 0..=segments {
            let ratio = i as f64 / segments as f64;
            let point = GeoPoint::new(
                start.lat + (end.lat - start.lat) * ratio,
                start.lon + (end.lon - start.lon) * ratio,
            );
            let cell = self.index(&point);
            if seen.insert(cell) {
                cells.push(cell);
            }
        }

        cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_round_trip() {
        let grid = GridIndexer::default();
        for &(lat, lon) in &[(28.6139, 77.2090), (-33.8688, 151.2093), (0.004, -0.006), (89.999, 179.999)] {
            let cell = grid.index(&GeoPoint::new(lat, lon));
            let center = grid.center(cell);
            assert_eq!(grid.index(&center), cell, "round trip failed for {},{}", lat, lon);
        }
    }

    #[test]
    fn test_rounds_to_nearest_node() {
        let grid = GridIndexer::default();
        let cell = grid.index(&GeoPoint::new(28.6139, 77.2090));
        assert_eq!(cell, GridCellId { lat_idx: 2861, lon_idx: 7721 });
        assert_eq!(grid.label(cell), "28.61_77.21");
    }

    #[test]
    fn test_rejects_bad_resolution() {
        assert!(GridIndexer::new(0.0).is_none());
        assert!(GridIndexer::new(-0.5).is_none());
        assert!(GridIndexer::new(f64::NAN).is_none());
        assert!(GridIndexer::new(0.05).is_some());
    }

    #[test]
    fn test_path_cells_deduplicated() {
        let grid = GridIndexer::default();
        let start = GeoPoint::new(28.600, 77.200);
        let end = GeoPoint::new(28.650, 77.220);
        let cells = grid.path_cells(&start, &end);

        assert_eq!(cells.first(), Some(&grid.index(&start)));
        assert_eq!(cells.last(), Some(&grid.index(&end)));

        let unique: HashSet<_> = cells.iter().collect();
        assert_eq!(unique.len(), cells.len());
        assert!(cells.len() >= 5);
    }

    #[test]
    fn test_degenerate_path_is_single_cell() {
        let grid = GridIndexer::default();
        let p = GeoPoint::new(12.9716, 77.5946);
        assert_eq!(grid.path_cells(&p, &p), vec![grid.index(&p)]);
    }
}
