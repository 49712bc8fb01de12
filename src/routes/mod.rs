// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Public route discovery from completed trips

mod matcher;

pub use matcher::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::spatial::GeoPoint;

/// Named endpoint of a trip or route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub name: String,
    pub point: GeoPoint,
}

impl Waypoint {
    pub fn new(name: &str, point: GeoPoint) -> Self {
        Self {
            name: name.to_string(),
            point,
        }
    }
}

/// A finished journey handed to the route matcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripCompletion {
    pub vehicle_id: String,
    #[serde(default)]
    pub journey_id: Option<String>,
    pub start: Waypoint,
    pub end: Waypoint,
    /// Meters
    #[serde(default)]
    pub distance_m: Option<f64>,
    #[serde(default)]
    pub duration_secs: Option<f64>,
    /// m/s
    #[serde(default)]
    pub average_speed: Option<f64>,
}

impl TripCompletion {
    pub fn new(vehicle_id: &str, start: Waypoint, end: Waypoint) -> Self {
        Self {
            vehicle_id: vehicle_id.to_string(),
            journey_id: None,
            start,
            end,
            distance_m: None,
            duration_secs: None,
            average_speed: None,
        }
    }

    pub fn with_stats(mut self, distance_m: Option<f64>, duration_secs: Option<f64>, average_speed: Option<f64>) -> Self {
        self.distance_m = distance_m;
        self.duration_secs = duration_secs;
        self.average_speed = average_speed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.vehicle_id.trim().is_empty() {
            return Err(CoreError::Validation("vehicle_id is required".into()));
        }
        if !self.start.point.is_valid() || !self.end.point.is_valid() {
            return Err(CoreError::Validation("trip endpoints out of range".into()));
        }
        for (name, value) in [
            ("distance_m", self.distance_m),
            ("duration_secs", self.duration_secs),
            ("average_speed", self.average_speed),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(CoreError::Validation(format!("{} must be a non-negative number", name)));
                }
            }
        }
        Ok(())
    }

    /// Reported average speed, else distance over duration
    pub fn effective_speed(&self) -> Option<f64> {
        self.average_speed.or_else(|| match (self.distance_m, self.duration_secs) {
            (Some(d), Some(t)) if t > 0.0 => Some(d / t),
            _ => None,
        })
    }
}

/// A start/end pair travelled repeatedly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub route_id: String,
    pub name: String,
    pub start: Waypoint,
    pub end: Waypoint,
    /// Once set, never cleared by matching
    pub is_public: bool,
    pub trip_count: u32,
    /// m/s
    pub average_speed: Option<f64>,
    /// Seconds
    pub average_duration: Option<f64>,
    pub speed_samples: u32,
    pub duration_samples: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Route {
    /// First sighting of a start/end pair
    pub fn from_trip(route_id: &str, trip: &TripCompletion, now: DateTime<Utc>) -> Self {
        let average_speed = trip.effective_speed();
        Self {
            route_id: route_id.to_string(),
            name: format!("{} to {}", trip.start.name, trip.end.name),
            start: trip.start.clone(),
            end: trip.end.clone(),
            is_public: false,
            trip_count: 1,
            average_speed,
            average_duration: trip.duration_secs,
            speed_samples: average_speed.is_some() as u32,
            duration_samples: trip.duration_secs.is_some() as u32,
            created_at: now,
            updated_at: now,
        }
    }

    /// Combined start + end distance when both lie within `proximity_m`
    pub fn match_distance(&self, trip: &TripCompletion, proximity_m: f64) -> Option<f64> {
        let start = self.start.point.distance_to(&trip.start.point);
        let end = self.end.point.distance_to(&trip.end.point);
        (start <= proximity_m && end <= proximity_m).then_some(start + end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trip() -> TripCompletion {
        TripCompletion::new(
            "BUS-12",
            Waypoint::new("Kashmere Gate", GeoPoint::new(28.6676, 77.2285)),
            Waypoint::new("Connaught Place", GeoPoint::new(28.6315, 77.2167)),
        )
    }

    #[test]
    fn test_route_from_trip() {
        let now = Utc::now();
        let route = Route::from_trip("R1", &trip().with_stats(Some(4200.0), Some(600.0), None), now);
        assert_eq!(route.name, "Kashmere Gate to Connaught Place");
        assert_eq!(route.trip_count, 1);
        assert!(!route.is_public);
        assert!((route.average_speed.unwrap() - 7.0).abs() < 1e-9);
        assert_eq!(route.average_duration, Some(600.0));
    }

    #[test]
    fn test_effective_speed() {
        assert_eq!(trip().effective_speed(), None);
        assert_eq!(trip().with_stats(Some(100.0), Some(0.0), None).effective_speed(), None);
        assert_eq!(trip().with_stats(Some(100.0), Some(10.0), Some(3.0)).effective_speed(), Some(3.0));
    }

    #[test]
    fn test_validate_trip() {
        assert!(trip().validate().is_ok());
        let mut bad = trip();
        bad.end.point = GeoPoint::new(95.0, 0.0);
        assert!(matches!(bad.validate(), Err(CoreError::Validation(_))));
        assert!(trip().with_stats(Some(-1.0), None, None).validate().is_err());
    }

    #[test]
    fn test_match_distance_needs_both_ends() {
        let route = Route::from_trip("R1", &trip(), Utc::now());
        assert_eq!(route.match_distance(&trip(), 50.0), Some(0.0));

        let mut moved = trip();
        moved.end.point = GeoPoint::new(28.6320, 77.2167);
        assert!(route.match_distance(&moved, 50.0).is_none());
    }
}
