// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Telemetry samples - the raw readings every detector consumes

mod history;

pub use history::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::spatial::GeoPoint;

/// Inbound reading as submitted by a device.
///
/// Field aliases accept the names older firmware uses on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleInput {
    pub device_id: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub altitude: Option<f64>,
    /// m/s
    #[serde(default)]
    pub speed: Option<f64>,
    /// Degrees, 0-360
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub pitch: Option<f64>,
    #[serde(default)]
    pub roll: Option<f64>,
    #[serde(default)]
    pub accel_x: Option<f64>,
    #[serde(default)]
    pub accel_y: Option<f64>,
    #[serde(default)]
    pub accel_z: Option<f64>,
    #[serde(default, alias = "engine_status")]
    pub engine_on: bool,
    #[serde(default, alias = "parking_status")]
    pub parked: bool,
    #[serde(default, alias = "ble_proximity")]
    pub owner_nearby: bool,
}

impl SampleInput {
    /// Minimal reading at a position; IMU and status fields left empty
    pub fn new(device_id: &str, timestamp: DateTime<Utc>, latitude: f64, longitude: f64) -> Self {
        Self {
            device_id: device_id.to_string(),
            timestamp,
            latitude,
            longitude,
            altitude: None,
            speed: None,
            heading: None,
            pitch: None,
            roll: None,
            accel_x: None,
            accel_y: None,
            accel_z: None,
            engine_on: false,
            parked: false,
            owner_nearby: false,
        }
    }

    /// Reject malformed or out-of-range readings
    pub fn validate(&self) -> Result<()> {
        if self.device_id.trim().is_empty() {
            return Err(CoreError::Validation("device_id is required".into()));
        }
        if !GeoPoint::new(self.latitude, self.longitude).is_valid() {
            return Err(CoreError::Validation(format!(
                "coordinates out of range: {}, {}",
                self.latitude, self.longitude
            )));
        }

        check_range("speed", self.speed, 0.0, f64::MAX)?;
        check_range("heading", self.heading, 0.0, 360.0)?;
        check_range("pitch", self.pitch, -90.0, 90.0)?;
        check_range("roll", self.roll, -180.0, 180.0)?;
        check_range("altitude", self.altitude, f64::MIN, f64::MAX)?;
        check_range("accel_x", self.accel_x, f64::MIN, f64::MAX)?;
        check_range("accel_y", self.accel_y, f64::MIN, f64::MAX)?;
        check_range("accel_z", self.accel_z, f64::MIN, f64::MAX)?;

        Ok(())
    }
}

fn check_range(field: &str, value: Option<f64>, min: f64, max: f64) -> Result<()> {
    match value {
        Some(v) if !v.is_finite() || v < min || v > max => Err(CoreError::Validation(format!(
            "{} = {} outside [{}, {}]",
            field, v, min, max
        ))),
        _ => Ok(()),
    }
}

/// A recorded reading. Immutable once created.
///
/// The acceleration magnitude is always derived from the three axes here and
/// can never be supplied by a caller.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySample {
    pub device_id: String,
    pub vehicle_id: String,
    pub timestamp: DateTime<Utc>,
    pub location: GeoPoint,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub pitch: Option<f64>,
    pub roll: Option<f64>,
    pub accel_x: Option<f64>,
    pub accel_y: Option<f64>,
    pub accel_z: Option<f64>,
    accel_magnitude: Option<f64>,
    pub engine_on: bool,
    pub parked: bool,
    pub owner_nearby: bool,
    pub received_at: DateTime<Utc>,
}

impl TelemetrySample {
    pub fn record(input: SampleInput, vehicle_id: &str, received_at: DateTime<Utc>) -> Self {
        let accel_magnitude = match (input.accel_x, input.accel_y, input.accel_z) {
            (Some(x), Some(y), Some(z)) => Some((x * x + y * y + z * z).sqrt()),
            _ => None,
        };

        Self {
            device_id: input.device_id,
            vehicle_id: vehicle_id.to_string(),
            timestamp: input.timestamp,
            location: GeoPoint::new(input.latitude, input.longitude),
            altitude: input.altitude,
            speed: input.speed,
            heading: input.heading,
            pitch: input.pitch,
            roll: input.roll,
            accel_x: input.accel_x,
            accel_y: input.accel_y,
            accel_z: input.accel_z,
            accel_magnitude,
            engine_on: input.engine_on,
            parked: input.parked,
            owner_nearby: input.owner_nearby,
            received_at,
        }
    }

    /// √(x² + y² + z²), present only when all three axes were reported
    pub fn accel_magnitude(&self) -> Option<f64> {
        self.accel_magnitude
    }

    pub fn is_moving_above(&self, threshold: f64) -> bool {
        self.speed.map(|s| s > threshold).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> SampleInput {
        SampleInput::new("dev-1", Utc::now(), 28.6139, 77.2090)
    }

    #[test]
    fn test_magnitude_derived_from_axes() {
        let mut raw = input();
        raw.accel_x = Some(3.0);
        raw.accel_y = Some(4.0);
        raw.accel_z = Some(12.0);
        let sample = TelemetrySample::record(raw, "V1", Utc::now());
        assert_eq!(sample.accel_magnitude(), Some(13.0));
    }

    #[test]
    fn test_magnitude_absent_without_all_axes() {
        let mut raw = input();
        raw.accel_x = Some(3.0);
        raw.accel_y = Some(4.0);
        let sample = TelemetrySample::record(raw, "V1", Utc::now());
        assert_eq!(sample.accel_magnitude(), None);
    }

    #[test]
    fn test_validation_rejects_out_of_range() {
        let mut raw = input();
        raw.latitude = 91.0;
        assert!(matches!(raw.validate(), Err(CoreError::Validation(_))));

        let mut raw = input();
        raw.speed = Some(-1.0);
        assert!(raw.validate().is_err());

        let mut raw = input();
        raw.pitch = Some(f64::NAN);
        assert!(raw.validate().is_err());

        let mut raw = input();
        raw.device_id = "  ".into();
        assert!(raw.validate().is_err());

        assert!(input().validate().is_ok());
    }

    #[test]
    fn test_wire_aliases() {
        let json = r#"{
            "device_id": "DEVICE123",
            "timestamp": "2024-01-15T10:30:00Z",
            "latitude": 28.6139,
            "longitude": 77.2090,
            "speed": 15.5,
            "engine_status": true,
            "parking_status": false,
            "ble_proximity": true
        }"#;
        let raw: SampleInput = serde_json::from_str(json).unwrap();
        assert!(raw.engine_on);
        assert!(!raw.parked);
        assert!(raw.owner_nearby);
        assert_eq!(raw.speed, Some(15.5));
        assert!(raw.pitch.is_none());
    }
}
