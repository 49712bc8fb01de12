// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Crash detection - impact signature between consecutive samples

use tracing::trace;

use super::Severity;
use crate::config::CrashConfig;
use crate::telemetry::TelemetrySample;

const MICROS: f64 = 1_000_000.0;

/// Readings that made a sample pair look like a crash
#[derive(Debug, Clone, PartialEq)]
pub struct CrashSignature {
    pub accel_magnitude: f64,
    pub g_force: f64,
    pub speed_before: f64,
    pub speed_after: f64,
    pub speed_drop_percent: f64,
    pub severity: Severity,
}

/// Stateless crash rule evaluated on (prior, current) samples of one device
pub struct CrashDetector {
    config: CrashConfig,
}

impl CrashDetector {
    pub fn new(config: CrashConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CrashConfig {
        &self.config
    }

    /// A crash needs, all at once:
    /// - a prior sample 1-2 s earlier,
    /// - g-force above threshold,
    /// - a sharp speed drop from a moving start,
    /// - tilt beyond the pitch or roll limit,
    /// - a strong horizontal axis reading.
    pub fn evaluate(&self, prior: &TelemetrySample, current: &TelemetrySample) -> Option<CrashSignature> {
        let cfg = &self.config;

        let speed_after = current.speed?;
        let gap_us = (current.timestamp - prior.timestamp).num_microseconds()? as f64;
        if gap_us < cfg.min_interval_secs * MICROS || gap_us > cfg.max_interval_secs * MICROS {
            trace!("{}: gap {:.6}s outside crash window", current.device_id, gap_us / MICROS);
            return None;
        }

        let accel_magnitude = current.accel_magnitude()?;
        let g_force = accel_magnitude / cfg.gravity;
        if g_force <= cfg.g_force_threshold {
            return None;
        }

        let speed_before = prior.speed.filter(|s| *s > 0.0)?;
        let speed_drop_percent = (speed_before - speed_after) / speed_before * 100.0;
        if speed_drop_percent <= cfg.speed_drop_percent {
            return None;
        }

        let beyond = |v: Option<f64>, limit: f64| v.is_some_and(|v| v.abs() > limit);
        if !(beyond(current.pitch, cfg.tilt_deg) || beyond(current.roll, cfg.tilt_deg)) {
            return None;
        }
        if !(beyond(current.accel_x, cfg.axis_accel) || beyond(current.accel_y, cfg.axis_accel)) {
            return None;
        }

        Some(CrashSignature {
            accel_magnitude,
            g_force,
            speed_before,
            speed_after,
            speed_drop_percent,
            severity: self.severity_for(g_force),
        })
    }

    /// Band g-force into a severity; every bound is strict
    pub fn severity_for(&self, g_force: f64) -> Severity {
        let cfg = &self.config;
        if g_force > cfg.critical_g {
            Severity::Critical
        } else if g_force > cfg.high_g {
            Severity::High
        } else if g_force > cfg.medium_g {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}
