// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Per-device sample history
//!
//! Each device owns a lane guarded by its own mutex. Ingestion holds the lane
//! lock for the whole read-prior/append/detect sequence, so two samples for the
//! same device are never evaluated against a stale or duplicated predecessor.

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

use super::TelemetrySample;

/// Timestamp-ordered samples of one device
#[derive(Debug, Default)]
pub struct DeviceLane {
    samples: VecDeque<TelemetrySample>,
}

impl DeviceLane {
    /// Most recent sample by timestamp
    pub fn latest(&self) -> Option<&TelemetrySample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Insert keeping timestamp order; late arrivals slot in behind newer samples
    pub fn insert(&mut self, sample: TelemetrySample) {
        let newest = self.samples.back().map(|s| s.timestamp);
        match newest {
            Some(ts) if sample.timestamp < ts => {
                let pos = self.samples.partition_point(|s| s.timestamp <= sample.timestamp);
                self.samples.insert(pos, sample);
            }
            _ => self.samples.push_back(sample),
        }
    }

    /// Samples with timestamp in `[end - span, end]`
    pub fn window(&self, end: DateTime<Utc>, span: Duration) -> impl Iterator<Item = &TelemetrySample> {
        let start = end - span;
        self.samples
            .iter()
            .filter(move |s| s.timestamp >= start && s.timestamp <= end)
    }

    /// Drop samples older than `cutoff`, returning how many were removed
    pub fn prune_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let mut removed = 0;
        while self.samples.front().map(|s| s.timestamp < cutoff).unwrap_or(false) {
            self.samples.pop_front();
            removed += 1;
        }
        removed
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &TelemetrySample> {
        self.samples.iter()
    }
}

/// Recent samples for every device, bounded by a retention window
pub struct SampleHistory {
    lanes: RwLock<HashMap<String, Arc<Mutex<DeviceLane>>>>,
    retention: Duration,
}

impl SampleHistory {
    pub fn new(retention: Duration) -> Self {
        Self {
            lanes: RwLock::new(HashMap::new()),
            retention,
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Lane for a device, created on first use
    pub fn lane(&self, device_id: &str) -> Arc<Mutex<DeviceLane>> {
        if let Some(lane) = self.lanes.read().get(device_id) {
            return lane.clone();
        }
        self.lanes
            .write()
            .entry(device_id.to_string())
            .or_default()
            .clone()
    }

    /// Append to a lane the caller already holds, trimming anything that fell
    /// out of retention relative to the lane's newest sample
    pub fn append(&self, lane: &mut DeviceLane, sample: TelemetrySample) {
        lane.insert(sample);
        if let Some(newest) = lane.latest().map(|s| s.timestamp) {
            lane.prune_before(newest - self.retention);
        }
    }

    /// Visit every sample with timestamp in `[from, to]` across all devices.
    ///
    /// Lanes are locked one at a time, so the view is not a global snapshot.
    pub fn for_each_between<F>(&self, from: DateTime<Utc>, to: DateTime<Utc>, mut visit: F)
    where
        F: FnMut(&TelemetrySample),
    {
        let lanes: Vec<_> = self.lanes.read().values().cloned().collect();
        for lane in lanes {
            let lane = lane.lock();
            for sample in lane.iter().filter(|s| s.timestamp >= from && s.timestamp <= to) {
                visit(sample);
            }
        }
    }

    /// Drop samples older than `now - retention` and forget empty lanes
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.retention;
        let mut removed = 0;
        let mut lanes = self.lanes.write();
        lanes.retain(|_, shared| {
            let mut lane = shared.lock();
            removed += lane.prune_before(cutoff);
            // a lane handed out to an ingest in flight must stay reachable
            !lane.is_empty() || Arc::strong_count(shared) > 1
        });
        if removed > 0 {
            debug!("Pruned {} samples from history ({} devices remain)", removed, lanes.len());
        }
        removed
    }

    pub fn device_count(&self) -> usize {
        self.lanes.read().len()
    }

    pub fn sample_count(&self) -> usize {
        self.lanes.read().values().map(|l| l.lock().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::SampleInput;

    fn sample(device: &str, at: DateTime<Utc>, speed: f64) -> TelemetrySample {
        let mut raw = SampleInput::new(device, at, 28.61, 77.21);
        raw.speed = Some(speed);
        TelemetrySample::record(raw, "V1", at)
    }

    #[test]
    fn test_late_sample_keeps_order() {
        let t0 = Utc::now();
        let mut lane = DeviceLane::default();
        lane.insert(sample("d", t0, 1.0));
        lane.insert(sample("d", t0 + Duration::seconds(4), 3.0));
        lane.insert(sample("d", t0 + Duration::seconds(2), 2.0));

        let speeds: Vec<_> = lane.iter().map(|s| s.speed.unwrap()).collect();
        assert_eq!(speeds, vec![1.0, 2.0, 3.0]);
        assert_eq!(lane.latest().unwrap().speed, Some(3.0));
    }

    #[test]
    fn test_window_is_inclusive() {
        let t0 = Utc::now();
        let mut lane = DeviceLane::default();
        for i in 0..=12 {
            lane.insert(sample("d", t0 + Duration::seconds(i), 2.0));
        }
        let end = t0 + Duration::seconds(12);
        assert_eq!(lane.window(end, Duration::seconds(10)).count(), 11);
    }

    #[test]
    fn test_append_trims_by_retention() {
        let history = SampleHistory::new(Duration::minutes(1));
        let lane = history.lane("d");
        let t0 = Utc::now();
        {
            let mut lane = lane.lock();
            history.append(&mut lane, sample("d", t0, 1.0));
            history.append(&mut lane, sample("d", t0 + Duration::seconds(30), 1.0));
            history.append(&mut lane, sample("d", t0 + Duration::seconds(90), 1.0));
        }
        assert_eq!(history.sample_count(), 2);
    }

    #[test]
    fn test_prune_forgets_idle_devices() {
        let history = SampleHistory::new(Duration::minutes(5));
        let t0 = Utc::now();
        for device in ["a", "b"] {
            let lane = history.lane(device);
            history.append(&mut lane.lock(), sample(device, t0, 1.0));
        }
        let lane = history.lane("b");
        history.append(&mut lane.lock(), sample("b", t0 + Duration::minutes(4), 1.0));

        let removed = history.prune(t0 + Duration::minutes(6));
        assert_eq!(removed, 2);
        assert_eq!(history.device_count(), 1);
    }

    #[test]
    fn test_for_each_between_spans_devices() {
        let history = SampleHistory::new(Duration::minutes(30));
        let t0 = Utc::now();
        for (i, device) in ["a", "b", "c"].iter().enumerate() {
            let lane = history.lane(device);
            history.append(&mut lane.lock(), sample(device, t0 + Duration::seconds(i as i64 * 60), 1.0));
        }
        let mut seen = 0;
        history.for_each_between(t0, t0 + Duration::seconds(90), |_| seen += 1);
        assert_eq!(seen, 2);
    }
}
