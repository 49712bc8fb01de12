// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Core engine module - wires detectors, lifecycle, traffic and routes together

mod engine;
mod event_bus;
mod scheduler;

pub use engine::*;
pub use event_bus::*;
pub use scheduler::Scheduler;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// System-wide state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemState {
    pub running: bool,
    pub devices_tracked: usize,
    pub samples_ingested: u64,
    pub crashes_detected: u64,
    pub thefts_detected: u64,
    pub escalations: u64,
    pub routes_known: usize,
    pub public_routes: usize,
    pub uptime_seconds: u64,
    pub last_detection: Option<DateTime<Utc>>,
}
