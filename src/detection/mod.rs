// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Detection module - crash and theft events and their lifecycle

mod book;
mod confirmation;
mod crash;
mod review;
mod theft;

pub use book::*;
pub use confirmation::*;
pub use crash::*;
pub use review::*;
pub use theft::*;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::spatial::GeoPoint;
use crate::telemetry::TelemetrySample;

/// Severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Crash lifecycle.
///
/// `AwaitingConfirmation` is the only state the owner can act on; the other
/// states are reached either from it or by a reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrashStatus {
    AwaitingConfirmation,
    Confirmed,
    FalseAlarm,
    EmergencyNotified,
    Resolved,
}

impl CrashStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CrashStatus::FalseAlarm | CrashStatus::Resolved)
    }
}

/// Theft lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TheftStatus {
    Detected,
    Confirmed,
    FalseAlarm,
    Recovered,
}

impl TheftStatus {
    /// Still needs attention from a reviewer
    pub fn is_unresolved(&self) -> bool {
        matches!(self, TheftStatus::Detected | TheftStatus::Confirmed)
    }
}

/// Detected crash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashEvent {
    pub id: Uuid,
    pub vehicle_id: String,
    pub journey_id: Option<String>,
    pub severity: Severity,
    pub status: CrashStatus,
    pub location: GeoPoint,

    // Impact readings
    pub accel_magnitude: f64,
    pub g_force: f64,
    pub speed_before: f64,
    pub speed_after: f64,
    pub speed_drop_percent: f64,
    pub pitch: Option<f64>,
    pub roll: Option<f64>,

    pub detected_at: DateTime<Utc>,
    pub confirmation_deadline: DateTime<Utc>,
    pub user_confirmed: bool,
    pub user_response_at: Option<DateTime<Utc>>,
    pub response_latency_ms: Option<i64>,

    // Dispatch flags
    pub ambulance_notified: bool,
    pub police_notified: bool,
    pub nearby_vehicles_notified: bool,

    pub notes: String,
    pub updated_at: DateTime<Utc>,
}

impl CrashEvent {
    /// Open a crash awaiting owner confirmation until `now + window`
    pub fn open(
        sample: &TelemetrySample,
        signature: &CrashSignature,
        journey_id: Option<String>,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            vehicle_id: sample.vehicle_id.clone(),
            journey_id,
            severity: signature.severity,
            status: CrashStatus::AwaitingConfirmation,
            location: sample.location,
            accel_magnitude: signature.accel_magnitude,
            g_force: signature.g_force,
            speed_before: signature.speed_before,
            speed_after: signature.speed_after,
            speed_drop_percent: signature.speed_drop_percent,
            pitch: sample.pitch,
            roll: sample.roll,
            detected_at: now,
            confirmation_deadline: now + window,
            user_confirmed: false,
            user_response_at: None,
            response_latency_ms: None,
            ambulance_notified: false,
            police_notified: false,
            nearby_vehicles_notified: false,
            notes: String::new(),
            updated_at: now,
        }
    }

    pub fn is_awaiting(&self) -> bool {
        self.status == CrashStatus::AwaitingConfirmation
    }

    /// Strictly after the deadline; a response exactly at it is on time
    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        now > self.confirmation_deadline
    }

    /// Move to EMERGENCY_NOTIFIED with every dispatch flag raised
    pub(crate) fn escalate(&mut self, user_confirmed: bool, now: DateTime<Utc>) {
        self.status = CrashStatus::EmergencyNotified;
        self.user_confirmed = user_confirmed;
        self.ambulance_notified = true;
        self.police_notified = true;
        self.nearby_vehicles_notified = true;
        self.updated_at = now;
    }

    pub(crate) fn record_response(&mut self, now: DateTime<Utc>) {
        self.user_response_at = Some(now);
        self.response_latency_ms = Some((now - self.detected_at).num_milliseconds());
    }
}

/// Detected theft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TheftEvent {
    pub id: Uuid,
    pub vehicle_id: String,
    pub status: TheftStatus,
    pub location: GeoPoint,
    /// m/s of the triggering sample
    pub speed_detected: f64,
    pub duration_seconds: i64,
    pub moving_samples: usize,
    pub engine_was_off: bool,
    pub owner_nearby: bool,
    pub owner_notified: bool,
    pub police_notified: bool,
    pub detected_at: DateTime<Utc>,
    pub notes: String,
    pub updated_at: DateTime<Utc>,
}

impl TheftEvent {
    pub fn open(sample: &TelemetrySample, signature: &TheftSignature, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            vehicle_id: sample.vehicle_id.clone(),
            status: TheftStatus::Detected,
            location: sample.location,
            speed_detected: signature.speed_detected,
            duration_seconds: signature.duration_seconds,
            moving_samples: signature.moving_samples,
            engine_was_off: !sample.engine_on,
            owner_nearby: sample.owner_nearby,
            owner_notified: true,
            police_notified: true,
            detected_at: now,
            notes: String::new(),
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::SampleInput;

    fn signature() -> CrashSignature {
        CrashSignature {
            accel_magnitude: 40.0,
            g_force: 40.0 / 9.8,
            speed_before: 20.0,
            speed_after: 6.0,
            speed_drop_percent: 70.0,
            severity: Severity::Low,
        }
    }

    #[test]
    fn test_open_crash_sets_deadline() {
        let now = Utc::now();
        let sample = TelemetrySample::record(SampleInput::new("d", now, 28.6, 77.2), "V1", now);
        let crash = CrashEvent::open(&sample, &signature(), None, now, Duration::seconds(15));

        assert!(crash.is_awaiting());
        assert_eq!(crash.confirmation_deadline, now + Duration::seconds(15));
        assert!(!crash.deadline_passed(crash.confirmation_deadline));
        assert!(crash.deadline_passed(crash.confirmation_deadline + Duration::milliseconds(1)));
    }

    #[test]
    fn test_escalate_raises_all_flags() {
        let now = Utc::now();
        let sample = TelemetrySample::record(SampleInput::new("d", now, 28.6, 77.2), "V1", now);
        let mut crash = CrashEvent::open(&sample, &signature(), None, now, Duration::seconds(15));
        crash.escalate(false, now);

        assert_eq!(crash.status, CrashStatus::EmergencyNotified);
        assert!(crash.ambulance_notified && crash.police_notified && crash.nearby_vehicles_notified);
        assert!(!crash.user_confirmed);
    }

    #[test]
    fn test_status_classes() {
        assert!(CrashStatus::FalseAlarm.is_terminal());
        assert!(!CrashStatus::EmergencyNotified.is_terminal());
        assert!(TheftStatus::Confirmed.is_unresolved());
        assert!(!TheftStatus::Recovered.is_unresolved());
        assert!(Severity::Critical > Severity::High);
    }
}
