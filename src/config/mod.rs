// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Configuration module

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Upper bound for the theft and confirmation windows
const MAX_WINDOW_SECS: i64 = 3600;
/// Upper bound for in-memory sample retention (one week)
const MAX_RETENTION_MINS: i64 = 7 * 24 * 60;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application name
    pub app_name: String,

    /// Data directory
    pub data_dir: PathBuf,

    /// Log level
    pub log_level: String,

    /// Feed the engine from the fleet simulator
    pub demo_mode: bool,

    /// Crash signature thresholds
    pub crash: CrashConfig,

    /// Theft signature thresholds
    pub theft: TheftConfig,

    /// Crash confirmation protocol
    pub confirmation: ConfirmationConfig,

    /// Congestion aggregation
    pub congestion: CongestionConfig,

    /// Public route discovery
    pub routes: RouteConfig,

    /// In-memory sample history
    pub history: HistoryConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Demo fleet simulator
    pub simulator: SimulatorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "RoadSense".to_string(),
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            demo_mode: false,
            crash: CrashConfig::default(),
            theft: TheftConfig::default(),
            confirmation: ConfirmationConfig::default(),
            congestion: CongestionConfig::default(),
            routes: RouteConfig::default(),
            history: HistoryConfig::default(),
            database: DatabaseConfig::default(),
            simulator: SimulatorConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("roadsense"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.congestion.resolution_deg.is_finite() && self.congestion.resolution_deg > 0.0) {
            return Err(anyhow!("congestion.resolution_deg must be positive"));
        }
        if self.crash.min_interval_secs > self.crash.max_interval_secs {
            return Err(anyhow!("crash.min_interval_secs exceeds crash.max_interval_secs"));
        }
        if self.routes.public_threshold == 0 {
            return Err(anyhow!("routes.public_threshold must be at least 1"));
        }
        if !(1..=MAX_WINDOW_SECS).contains(&self.theft.window_secs) {
            return Err(anyhow!("theft.window_secs must be within 1..={}", MAX_WINDOW_SECS));
        }
        if !(1..=MAX_WINDOW_SECS).contains(&self.confirmation.window_secs) {
            return Err(anyhow!("confirmation.window_secs must be within 1..={}", MAX_WINDOW_SECS));
        }
        if !(1..=MAX_RETENTION_MINS).contains(&self.history.retention_mins) {
            return Err(anyhow!("history.retention_mins must be within 1..={}", MAX_RETENTION_MINS));
        }
        let congestion = &self.congestion;
        if congestion.general_window_mins <= 0 || congestion.route_window_mins <= 0 {
            return Err(anyhow!("congestion windows must be positive"));
        }
        let widest = congestion.general_window_mins.max(congestion.route_window_mins);
        if widest > self.history.retention_mins {
            return Err(anyhow!(
                "congestion window of {} min exceeds history.retention_mins ({})",
                widest,
                self.history.retention_mins
            ));
        }
        Ok(())
    }
}

/// Crash detector thresholds. All comparisons are strict.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashConfig {
    /// Minimum gap to the prior sample (seconds, inclusive)
    pub min_interval_secs: f64,
    /// Maximum gap to the prior sample (seconds, inclusive)
    pub max_interval_secs: f64,
    /// Standard gravity used to normalise acceleration
    pub gravity: f64,
    pub g_force_threshold: f64,
    pub speed_drop_percent: f64,
    /// Pitch or roll beyond this many degrees
    pub tilt_deg: f64,
    /// Longitudinal/lateral spike in m/s²
    pub axis_accel: f64,
    pub medium_g: f64,
    pub high_g: f64,
    pub critical_g: f64,
    /// Skip detection while the vehicle already has a crash awaiting confirmation
    pub suppress_while_open: bool,
}

impl Default for CrashConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: 1.0,
            max_interval_secs: 2.0,
            gravity: 9.8,
            g_force_threshold: 3.5,
            speed_drop_percent: 60.0,
            tilt_deg: 45.0,
            axis_accel: 5.0,
            medium_g: 4.5,
            high_g: 6.0,
            critical_g: 8.0,
            suppress_while_open: true,
        }
    }
}

/// Theft detector thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TheftConfig {
    /// Movement threshold in m/s (~5 km/h)
    pub speed_threshold: f64,
    /// Trailing window in seconds
    pub window_secs: i64,
    /// Moving samples required inside the window
    pub min_moving_samples: usize,
    /// Skip detection while the vehicle has an unresolved theft event
    pub suppress_while_open: bool,
}

impl Default for TheftConfig {
    fn default() -> Self {
        Self {
            speed_threshold: 1.39,
            window_secs: 10,
            min_moving_samples: 5,
            suppress_while_open: true,
        }
    }
}

/// Crash confirmation protocol
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    /// Time given to the owner to dispute a crash
    pub window_secs: i64,
    /// How often the deadline sweep runs
    pub sweep_interval_ms: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            window_secs: 15,
            sweep_interval_ms: 1000,
        }
    }
}

/// Congestion aggregation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CongestionConfig {
    /// Grid resolution in degrees
    pub resolution_deg: f64,
    /// Default window for area-wide queries
    pub general_window_mins: i64,
    /// Default window for route or path queries
    pub route_window_mins: i64,
    /// LOW requires fewer vehicles than this...
    pub low_max_vehicles: usize,
    /// ...and a mean speed above this (km/h)
    pub low_min_speed_kmh: f64,
    pub medium_max_vehicles: usize,
    pub medium_min_speed_kmh: f64,
    /// Period of the background cache refresh
    pub refresh_interval_secs: u64,
}

impl Default for CongestionConfig {
    fn default() -> Self {
        Self {
            resolution_deg: 0.01,
            general_window_mins: 30,
            route_window_mins: 10,
            low_max_vehicles: 10,
            low_min_speed_kmh: 25.0,
            medium_max_vehicles: 20,
            medium_min_speed_kmh: 15.0,
            refresh_interval_secs: 60,
        }
    }
}

/// How route statistics absorb a new trip
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AveragingMode {
    /// `old + (new - old) / n` over all trips
    RunningMean,
    /// `(old + new) / 2`, biased towards recent trips
    TwoPoint,
}

/// Which route wins when several match a trip
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Oldest matching route
    FirstMatch,
    /// Smallest combined start + end distance
    Nearest,
}

/// Public route discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Start/end proximity in meters
    pub proximity_m: f64,
    /// Trip count at which a route becomes public
    pub public_threshold: u32,
    pub averaging: AveragingMode,
    pub tie_break: TieBreak,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            proximity_m: 50.0,
            public_threshold: 5,
            averaging: AveragingMode::RunningMean,
            tie_break: TieBreak::FirstMatch,
        }
    }
}

/// In-memory sample history
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Samples older than this (relative to the device's newest) are dropped
    pub retention_mins: i64,
    pub prune_interval_secs: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            retention_mins: 30,
            prune_interval_secs: 60,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Enable database storage
    pub enabled: bool,

    /// Database path
    pub path: PathBuf,

    /// Retention period for raw samples in days
    pub retention_days: u32,

    /// Cleanup interval in seconds
    pub cleanup_interval_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("./data/roadsense.db"),
            retention_days: 30,
            cleanup_interval_secs: 3600,
        }
    }
}

/// Demo fleet simulator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub vehicles: usize,
    /// Interval between fleet ticks
    pub tick_ms: u64,
    pub center_lat: f64,
    pub center_lon: f64,
    /// Spread of the fleet around the centre, in degrees
    pub spread_deg: f64,
    /// Per-vehicle, per-tick probability of starting a crash scenario
    pub crash_probability: f64,
    /// Per-vehicle, per-tick probability of starting a theft scenario
    pub theft_probability: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            vehicles: 25,
            tick_ms: 1000,
            center_lat: 28.6139,
            center_lon: 77.2090,
            spread_deg: 0.05,
            crash_probability: 0.0005,
            theft_probability: 0.0005,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol_constants() {
        let config = Config::default();
        assert_eq!(config.confirmation.window_secs, 15);
        assert_eq!(config.routes.public_threshold, 5);
        assert_eq!(config.routes.proximity_m, 50.0);
        assert_eq!(config.congestion.resolution_deg, 0.01);
        assert_eq!(config.theft.min_moving_samples, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::load_or_create(&path).unwrap();
        assert!(path.exists());

        config.routes.averaging = AveragingMode::TwoPoint;
        config.routes.tie_break = TieBreak::Nearest;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.routes.averaging, AveragingMode::TwoPoint);
        assert_eq!(loaded.routes.tie_break, TieBreak::Nearest);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "log_level = \"debug\"\n[routes]\npublic_threshold = 3\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.routes.public_threshold, 3);
        assert_eq!(config.routes.proximity_m, 50.0);
        assert_eq!(config.crash.g_force_threshold, 3.5);
    }

    #[test]
    fn test_congestion_window_must_fit_retention() {
        let mut config = Config::default();
        config.congestion.general_window_mins = 60;
        assert!(config.validate().is_err());

        config.history.retention_mins = 60;
        assert!(config.validate().is_ok());

        config.congestion.route_window_mins = 90;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_windows() {
        let mut config = Config::default();
        config.confirmation.window_secs = i64::MAX;
        assert!(config.validate().is_err());
        config.confirmation.window_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.theft.window_secs = i64::MAX / 1000;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.history.retention_mins = i64::MAX;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_resolution() {
        let mut config = Config::default();
        config.congestion.resolution_deg = 0.0;
        assert!(config.validate().is_err());
    }
}
