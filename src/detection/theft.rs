// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Theft detection - sustained movement of a parked vehicle

use chrono::Duration;
use tracing::trace;

use crate::config::TheftConfig;
use crate::telemetry::{DeviceLane, TelemetrySample};

/// Readings that made a sample look like a theft in progress
#[derive(Debug, Clone, PartialEq)]
pub struct TheftSignature {
    pub speed_detected: f64,
    pub moving_samples: usize,
    /// Length of the sustained-motion window that was satisfied
    pub duration_seconds: i64,
}

pub struct TheftDetector {
    config: TheftConfig,
}

impl TheftDetector {
    pub fn new(config: TheftConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TheftConfig {
        &self.config
    }

    /// Evaluate `current` against the device lane it was just appended to
    pub fn evaluate(&self, current: &TelemetrySample, lane: &DeviceLane) -> Option<TheftSignature> {
        let cfg = &self.config;

        if !current.parked || current.engine_on || current.owner_nearby {
            return None;
        }
        let speed = current.speed.filter(|s| *s > cfg.speed_threshold)?;

        let moving = lane
            .window(current.timestamp, Duration::seconds(cfg.window_secs))
            .filter(|sample| sample.is_moving_above(cfg.speed_threshold))
            .count();

        if moving < cfg.min_moving_samples {
            trace!("{}: {} moving samples while parked", current.device_id, moving);
            return None;
        }

        Some(TheftSignature {
            speed_detected: speed,
            moving_samples: moving,
            duration_seconds: cfg.window_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::SampleInput;
    use chrono::{DateTime, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 2, 0, 0).unwrap()
    }

    fn parked_sample(offset_ms: i64, speed: f64) -> TelemetrySample {
        let mut input = SampleInput::new("dev-9", t0() + Duration::milliseconds(offset_ms), 28.61, 77.21);
        input.speed = Some(speed);
        input.parked = true;
        input.engine_on = false;
        input.owner_nearby = false;
        TelemetrySample::record(input, "V9", t0())
    }

    fn lane_of(samples: &[TelemetrySample]) -> DeviceLane {
        let mut lane = DeviceLane::default();
        for s in samples {
            lane.insert(s.clone());
        }
        lane
    }

    #[test]
    fn test_sustained_movement_while_parked() {
        let detector = TheftDetector::new(TheftConfig::default());
        let samples: Vec<_> = (0..6).map(|i| parked_sample(i * 2000, 2.0)).collect();
        let lane = lane_of(&samples);

        let sig = detector.evaluate(samples.last().unwrap(), &lane).expect("theft");
        assert_eq!(sig.duration_seconds, 10);
        assert_eq!(sig.moving_samples, 6);
        assert!((sig.speed_detected - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_duration_reports_configured_window() {
        let detector = TheftDetector::new(TheftConfig::default());
        // fifth moving sample arrives 8s after the first
        let samples: Vec<_> = (0..5).map(|i| parked_sample(i * 2000, 2.0)).collect();
        let lane = lane_of(&samples);

        let sig = detector.evaluate(samples.last().unwrap(), &lane).expect("theft");
        assert_eq!(sig.moving_samples, 5);
        assert_eq!(sig.duration_seconds, 10);

        let detector = TheftDetector::new(TheftConfig {
            window_secs: 20,
            ..TheftConfig::default()
        });
        let sig = detector.evaluate(samples.last().unwrap(), &lane).expect("theft");
        assert_eq!(sig.duration_seconds, 20);
    }

    #[test]
    fn test_too_few_moving_samples() {
        let detector = TheftDetector::new(TheftConfig::default());
        let mut samples: Vec<_> = (0..3).map(|i| parked_sample(i * 2000, 2.0)).collect();
        samples.push(parked_sample(6000, 1.0));
        samples.push(parked_sample(8000, 1.39));
        samples.push(parked_sample(10_000, 2.0));
        let lane = lane_of(&samples);

        assert!(detector.evaluate(samples.last().unwrap(), &lane).is_none());
    }

    #[test]
    fn test_samples_outside_window_ignored() {
        let detector = TheftDetector::new(TheftConfig::default());
        let samples: Vec<_> = [0, 1000, 11_500, 13_000, 14_000, 15_000]
            .iter()
            .map(|ms| parked_sample(*ms, 3.0))
            .collect();
        let lane = lane_of(&samples);

        // only 4 samples fall in [5s, 15s]
        assert!(detector.evaluate(samples.last().unwrap(), &lane).is_none());
    }

    #[test]
    fn test_status_gates() {
        let detector = TheftDetector::new(TheftConfig::default());
        let mut samples: Vec<_> = (0..6).map(|i| parked_sample(i * 2000, 2.0)).collect();
        let lane = lane_of(&samples);

        let trigger = samples.last_mut().unwrap();
        trigger.owner_nearby = true;
        assert!(detector.evaluate(trigger, &lane).is_none());

        trigger.owner_nearby = false;
        trigger.engine_on = true;
        assert!(detector.evaluate(trigger, &lane).is_none());

        trigger.engine_on = false;
        trigger.parked = false;
        assert!(detector.evaluate(trigger, &lane).is_none());

        trigger.parked = true;
        trigger.speed = Some(1.39);
        assert!(detector.evaluate(trigger, &lane).is_none());
    }
}
