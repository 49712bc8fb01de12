// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! In-memory book of crash and theft events
//!
//! Each event sits behind its own mutex. Anything that changes an event's
//! status (owner confirmation, deadline sweep, reviewer) takes that mutex and
//! re-checks the status first, so exactly one transition out of a state wins.
//! Lock order is always map before event.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{CrashEvent, TheftEvent};

pub type SharedCrash = Arc<Mutex<CrashEvent>>;
pub type SharedTheft = Arc<Mutex<TheftEvent>>;

#[derive(Default)]
pub struct EventBook {
    crashes: RwLock<HashMap<Uuid, SharedCrash>>,
    thefts: RwLock<HashMap<Uuid, SharedTheft>>,
}

impl EventBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new crash. With `suppress_while_open`, a vehicle that already
    /// has a crash awaiting confirmation gets no second one and `false` is returned.
    pub fn open_crash(&self, event: CrashEvent, suppress_while_open: bool) -> bool {
        let mut crashes = self.crashes.write();
        if suppress_while_open
            && crashes.values().any(|c| {
                let c = c.lock();
                c.vehicle_id == event.vehicle_id && c.is_awaiting()
            })
        {
            return false;
        }
        crashes.insert(event.id, Arc::new(Mutex::new(event)));
        true
    }

    /// Record a new theft, optionally suppressed while one is unresolved
    pub fn open_theft(&self, event: TheftEvent, suppress_while_open: bool) -> bool {
        let mut thefts = self.thefts.write();
        if suppress_while_open
            && thefts.values().any(|t| {
                let t = t.lock();
                t.vehicle_id == event.vehicle_id && t.status.is_unresolved()
            })
        {
            return false;
        }
        thefts.insert(event.id, Arc::new(Mutex::new(event)));
        true
    }

    /// Reload an event from storage without gating
    pub fn restore_crash(&self, event: CrashEvent) {
        self.crashes.write().insert(event.id, Arc::new(Mutex::new(event)));
    }

    pub fn restore_theft(&self, event: TheftEvent) {
        self.thefts.write().insert(event.id, Arc::new(Mutex::new(event)));
    }

    pub fn crash(&self, id: &Uuid) -> Option<SharedCrash> {
        self.crashes.read().get(id).cloned()
    }

    pub fn theft(&self, id: &Uuid) -> Option<SharedTheft> {
        self.thefts.read().get(id).cloned()
    }

    /// Awaiting crashes whose confirmation window closed before `now`
    pub fn overdue_crashes(&self, now: DateTime<Utc>) -> Vec<SharedCrash> {
        self.crashes
            .read()
            .values()
            .filter(|c| {
                let c = c.lock();
                c.is_awaiting() && c.deadline_passed(now)
            })
            .cloned()
            .collect()
    }

    /// Snapshot of matching crashes, newest first
    pub fn crashes<F>(&self, keep: F) -> Vec<CrashEvent>
    where
        F: Fn(&CrashEvent) -> bool,
    {
        let mut out: Vec<CrashEvent> = self
            .crashes
            .read()
            .values()
            .map(|c| c.lock().clone())
            .filter(|c| keep(c))
            .collect();
        out.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        out
    }

    /// Snapshot of matching thefts, newest first
    pub fn thefts<F>(&self, keep: F) -> Vec<TheftEvent>
    where
        F: Fn(&TheftEvent) -> bool,
    {
        let mut out: Vec<TheftEvent> = self
            .thefts
            .read()
            .values()
            .map(|t| t.lock().clone())
            .filter(|t| keep(t))
            .collect();
        out.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        out
    }

    pub fn crash_count(&self) -> usize {
        self.crashes.read().len()
    }

    pub fn theft_count(&self) -> usize {
        self.thefts.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{CrashSignature, CrashStatus, Severity, TheftSignature, TheftStatus};
    use crate::telemetry::{SampleInput, TelemetrySample};
    use chrono::Duration;

    fn crash(vehicle: &str, now: DateTime<Utc>) -> CrashEvent {
        let sample = TelemetrySample::record(SampleInput::new("d", now, 28.6, 77.2), vehicle, now);
        let sig = CrashSignature {
            accel_magnitude: 50.0,
            g_force: 5.1,
            speed_before: 15.0,
            speed_after: 2.0,
            speed_drop_percent: 86.7,
            severity: Severity::Medium,
        };
        CrashEvent::open(&sample, &sig, None, now, Duration::seconds(15))
    }

    fn theft(vehicle: &str, now: DateTime<Utc>) -> TheftEvent {
        let sample = TelemetrySample::record(SampleInput::new("d", now, 28.6, 77.2), vehicle, now);
        let sig = TheftSignature {
            speed_detected: 2.0,
            moving_samples: 5,
            duration_seconds: 8,
        };
        TheftEvent::open(&sample, &sig, now)
    }

    #[test]
    fn test_open_crash_suppressed_while_awaiting() {
        let book = EventBook::new();
        let now = Utc::now();
        assert!(book.open_crash(crash("V1", now), true));
        assert!(!book.open_crash(crash("V1", now), true));
        assert!(book.open_crash(crash("V2", now), true));
        assert!(book.open_crash(crash("V1", now), false));
        assert_eq!(book.crash_count(), 3);
    }

    #[test]
    fn test_resolved_crash_no_longer_gates() {
        let book = EventBook::new();
        let now = Utc::now();
        let first = crash("V1", now);
        let id = first.id;
        book.open_crash(first, true);

        book.crash(&id).unwrap().lock().status = CrashStatus::FalseAlarm;
        assert!(book.open_crash(crash("V1", now), true));
    }

    #[test]
    fn test_open_theft_gated_until_resolved() {
        let book = EventBook::new();
        let now = Utc::now();
        let first = theft("V3", now);
        let id = first.id;
        assert!(book.open_theft(first, true));
        assert!(!book.open_theft(theft("V3", now), true));

        book.theft(&id).unwrap().lock().status = TheftStatus::Recovered;
        assert!(book.open_theft(theft("V3", now), true));
    }

    #[test]
    fn test_overdue_and_ordering() {
        let book = EventBook::new();
        let now = Utc::now();
        let old = crash("V1", now - Duration::seconds(30));
        let fresh = crash("V2", now);
        let old_id = old.id;
        book.open_crash(old, true);
        book.open_crash(fresh, true);

        let overdue = book.overdue_crashes(now);
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].lock().id, old_id);

        let listed = book.crashes(|_| true);
        assert_eq!(listed[0].vehicle_id, "V2");
        assert_eq!(listed[1].vehicle_id, "V1");
    }
}
