// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Congestion aggregation over the in-memory sample history

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::CongestionLevel;
use crate::config::CongestionConfig;
use crate::error::{CoreError, Result};
use crate::spatial::{haversine_m, GeoPoint, GridCellId, GridIndexer};
use crate::telemetry::SampleHistory;

/// Computed congestion of one grid cell
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellCongestion {
    pub cell: GridCellId,
    pub label: String,
    pub center: GeoPoint,
    pub vehicle_count: usize,
    pub average_speed_kmh: f64,
    pub level: CongestionLevel,
    /// Display colour of `level`
    pub color: &'static str,
    pub description: &'static str,
    pub computed_at: DateTime<Utc>,
}

/// Mean over the reported cells of a query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallCongestion {
    pub level: CongestionLevel,
    pub color: &'static str,
    pub description: &'static str,
    pub mean_vehicle_count: f64,
    pub mean_speed_kmh: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CongestionReport {
    pub window_mins: i64,
    /// Populated cells only
    pub cells: Vec<CellCongestion>,
    /// `None` when no cell in scope had samples
    pub overall: Option<OverallCongestion>,
    /// Straight-line length of a path query
    pub distance_km: Option<f64>,
    pub estimated_minutes: Option<f64>,
    pub computed_at: DateTime<Utc>,
}

#[derive(Default)]
struct CellTally {
    vehicles: HashSet<String>,
    speed_sum: f64,
    speed_count: usize,
}

/// Read-mostly aggregator; the per-cell cache only remembers the latest result
pub struct CongestionAggregator {
    config: CongestionConfig,
    grid: GridIndexer,
    cache: RwLock<HashMap<GridCellId, CellCongestion>>,
}

impl CongestionAggregator {
    pub fn new(config: CongestionConfig) -> Result<Self> {
        let grid = GridIndexer::new(config.resolution_deg).ok_or_else(|| {
            CoreError::Validation(format!("invalid grid resolution {}", config.resolution_deg))
        })?;
        Ok(Self {
            config,
            grid,
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn grid(&self) -> &GridIndexer {
        &self.grid
    }

    pub fn config(&self) -> &CongestionConfig {
        &self.config
    }

    /// Strict comparisons: 10 vehicles at 25 km/h is MEDIUM
    pub fn classify(&self, vehicles: f64, speed_kmh: f64) -> CongestionLevel {
        let cfg = &self.config;
        if vehicles < cfg.low_max_vehicles as f64 && speed_kmh > cfg.low_min_speed_kmh {
            CongestionLevel::Low
        } else if vehicles < cfg.medium_max_vehicles as f64 && speed_kmh > cfg.medium_min_speed_kmh {
            CongestionLevel::Medium
        } else {
            CongestionLevel::High
        }
    }

    fn tally(
        &self,
        history: &SampleHistory,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        scope: Option<&HashSet<GridCellId>>,
    ) -> HashMap<GridCellId, CellTally> {
        let mut cells: HashMap<GridCellId, CellTally> = HashMap::new();
        history.for_each_between(from, to, |sample| {
            let cell = self.grid.index(&sample.location);
            if scope.is_some_and(|s| !s.contains(&cell)) {
                return;
            }
            let tally = cells.entry(cell).or_default();
            tally.vehicles.insert(sample.vehicle_id.clone());
            if let Some(speed) = sample.speed {
                tally.speed_sum += speed;
                tally.speed_count += 1;
            }
        });
        cells
    }

    fn evaluate(&self, cell: GridCellId, tally: &CellTally, now: DateTime<Utc>) -> CellCongestion {
        let mean_mps = if tally.speed_count > 0 {
            tally.speed_sum / tally.speed_count as f64
        } else {
            0.0
        };
        let vehicle_count = tally.vehicles.len();
        let average_speed_kmh = mean_mps * 3.6;

        let level = self.classify(vehicle_count as f64, average_speed_kmh);
        CellCongestion {
            cell,
            label: self.grid.label(cell),
            center: self.grid.center(cell),
            vehicle_count,
            average_speed_kmh,
            level,
            color: level.color(),
            description: level.description(),
            computed_at: now,
        }
    }

    fn overall(&self, cells: &[CellCongestion]) -> Option<OverallCongestion> {
        if cells.is_empty() {
            return None;
        }
        let n = cells.len() as f64;
        let mean_vehicle_count = cells.iter().map(|c| c.vehicle_count as f64).sum::<f64>() / n;
        let mean_speed_kmh = cells.iter().map(|c| c.average_speed_kmh).sum::<f64>() / n;
        let level = self.classify(mean_vehicle_count, mean_speed_kmh);
        Some(OverallCongestion {
            level,
            color: level.color(),
            description: level.description(),
            mean_vehicle_count,
            mean_speed_kmh,
        })
    }

    fn remember(&self, cells: &[CellCongestion]) {
        let mut cache = self.cache.write();
        for c in cells {
            cache.insert(c.cell, c.clone());
        }
    }

    /// Every populated cell in `[now - window, now]`, ordered by cell id
    pub fn area(&self, history: &SampleHistory, window: Duration, now: DateTime<Utc>) -> CongestionReport {
        let tallies = self.tally(history, window_start(now, window), now, None);
        let mut cells: Vec<CellCongestion> = tallies
            .iter()
            .map(|(cell, tally)| self.evaluate(*cell, tally, now))
            .collect();
        cells.sort_by_key(|c| c.cell);

        self.remember(&cells);
        debug!("Congestion over {} cells", cells.len());

        CongestionReport {
            window_mins: window.num_minutes(),
            overall: self.overall(&cells),
            cells,
            distance_km: None,
            estimated_minutes: None,
            computed_at: now,
        }
    }

    /// Cells along the straight line `start -> end`, in travel order
    pub fn path(
        &self,
        history: &SampleHistory,
        start: &GeoPoint,
        end: &GeoPoint,
        window: Duration,
        now: DateTime<Utc>,
    ) -> CongestionReport {
        let path = self.grid.path_cells(start, end);
        let scope: HashSet<GridCellId> = path.iter().copied().collect();
        let tallies = self.tally(history, window_start(now, window), now, Some(&scope));

        let cells: Vec<CellCongestion> = path
            .iter()
            .filter_map(|cell| tallies.get(cell).map(|t| self.evaluate(*cell, t, now)))
            .collect();
        self.remember(&cells);

        let overall = self.overall(&cells);
        let distance_km = haversine_m(start, end) / 1000.0;
        let estimated_minutes = overall
            .as_ref()
            .map(|o| distance_km / o.mean_speed_kmh.max(1.0) * 60.0);

        CongestionReport {
            window_mins: window.num_minutes(),
            cells,
            overall,
            distance_km: Some(distance_km),
            estimated_minutes,
            computed_at: now,
        }
    }

    /// Recompute the general window into the cache
    pub fn refresh(&self, history: &SampleHistory, now: DateTime<Utc>) -> usize {
        let report = self.area(history, Duration::minutes(self.config.general_window_mins), now);
        report.cells.len()
    }

    pub fn cached(&self, cell: GridCellId) -> Option<CellCongestion> {
        self.cache.read().get(&cell).cloned()
    }
}

fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC)
}
