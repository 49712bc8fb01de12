// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Road usage heat map

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::spatial::{GeoPoint, GridCellId, GridIndexer};
use crate::telemetry::SampleHistory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UsageLevel {
    MostUsed,
    FrequentlyUsed,
    MediumUsed,
    RarelyUsed,
}

impl UsageLevel {
    pub fn from_passes(passes: usize) -> Self {
        match passes {
            n if n >= 20 => UsageLevel::MostUsed,
            n if n >= 10 => UsageLevel::FrequentlyUsed,
            n if n >= 5 => UsageLevel::MediumUsed,
            _ => UsageLevel::RarelyUsed,
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            UsageLevel::MostUsed => "#FF0000",
            UsageLevel::FrequentlyUsed => "#FFA500",
            UsageLevel::MediumUsed => "#0000FF",
            UsageLevel::RarelyUsed => "#00FF00",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HeatmapCell {
    pub cell: GridCellId,
    pub label: String,
    pub center: GeoPoint,
    pub pass_count: usize,
    pub usage: UsageLevel,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageHeatmap {
    /// Busiest first
    pub cells: Vec<HeatmapCell>,
    pub total_points: usize,
    pub max_passes: usize,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl UsageHeatmap {
    /// Count samples per cell in `[from, to]`, optionally for one vehicle
    pub fn build(
        grid: &GridIndexer,
        history: &SampleHistory,
        vehicle_id: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Self {
        let mut counts: HashMap<GridCellId, usize> = HashMap::new();
        let mut total_points = 0;

        history.for_each_between(from, to, |sample| {
            if vehicle_id.map_or(true, |v| v == sample.vehicle_id) {
                *counts.entry(grid.index(&sample.location)).or_insert(0) += 1;
                total_points += 1;
            }
        });

        let mut cells: Vec<HeatmapCell> = counts
            .into_iter()
            .map(|(cell, pass_count)| HeatmapCell {
                cell,
                label: grid.label(cell),
                center: grid.center(cell),
                pass_count,
                usage: UsageLevel::from_passes(pass_count),
            })
            .collect();
        cells.sort_by(|a, b| b.pass_count.cmp(&a.pass_count).then(a.cell.cmp(&b.cell)));

        Self {
            max_passes: cells.first().map(|c| c.pass_count).unwrap_or(0),
            cells,
            total_points,
            from,
            to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{SampleInput, TelemetrySample};
    use chrono::Duration;

    #[test]
    fn test_usage_bands() {
        assert_eq!(UsageLevel::from_passes(20), UsageLevel::MostUsed);
        assert_eq!(UsageLevel::from_passes(19), UsageLevel::FrequentlyUsed);
        assert_eq!(UsageLevel::from_passes(10), UsageLevel::FrequentlyUsed);
        assert_eq!(UsageLevel::from_passes(5), UsageLevel::MediumUsed);
        assert_eq!(UsageLevel::from_passes(4), UsageLevel::RarelyUsed);
    }

    #[test]
    fn test_heatmap_counts_and_order() {
        let grid = GridIndexer::default();
        let history = SampleHistory::new(Duration::minutes(30));
        let now = Utc::now();

        let push = |device: &str, vehicle: &str, lat: f64, n: i64| {
            let lane = history.lane(device);
            let mut lane = lane.lock();
            for i in 0..n {
                let ts = now - Duration::seconds(n - i);
                let sample = TelemetrySample::record(SampleInput::new(device, ts, lat, 77.20), vehicle, ts);
                history.append(&mut lane, sample);
            }
        };
        push("d1", "V1", 28.60, 12);
        push("d2", "V2", 28.70, 3);
        push("d3", "V2", 28.60, 6);

        let all = UsageHeatmap::build(&grid, &history, None, now - Duration::minutes(5), now);
        assert_eq!(all.total_points, 21);
        assert_eq!(all.max_passes, 18);
        assert_eq!(all.cells[0].usage, UsageLevel::FrequentlyUsed);
        assert_eq!(all.cells[1].usage, UsageLevel::RarelyUsed);

        let v2 = UsageHeatmap::build(&grid, &history, Some("V2"), now - Duration::minutes(5), now);
        assert_eq!(v2.total_points, 9);
        assert_eq!(v2.cells[0].pass_count, 6);
    }
}
