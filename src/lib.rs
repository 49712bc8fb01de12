// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! RoadSense - Real-time Vehicle Telemetry Core
//!
//! Ingests per-device telemetry from a connected-vehicle fleet and turns it into:
//! - Crash events with a timed owner confirmation and automatic escalation
//! - Theft events for parked vehicles that start moving
//! - Grid-based congestion reports and road-usage heat maps
//! - Public routes discovered from repeated completed trips
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     RoadSense Engine                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐  ┌───────────┐  ┌────────────┐  ┌──────────┐  │
//! │  │ Sample   │→ │ Crash /   │→ │ Confirm /  │  │  Route   │  │
//! │  │ History  │  │ Theft Det.│  │ Review     │  │  Matcher │  │
//! │  └──────────┘  └───────────┘  └────────────┘  └──────────┘  │
//! │       ↓              ↓              ↓              ↓        │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │              Event Bus / Notification Intents       │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! │       ↓              ↓              ↓              ↓        │
//! │  ┌──────────┐  ┌───────────┐  ┌────────────┐  ┌──────────┐  │
//! │  │Congestion│  │  Heat Map │  │  Database  │  │ Registry │  │
//! │  │  Grid    │  │           │  │  (SQLite)  │  │          │  │
//! │  └──────────┘  └───────────┘  └────────────┘  └──────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod core;
pub mod db;
pub mod detection;
pub mod error;
pub mod registry;
pub mod routes;
pub mod simulator;
pub mod spatial;
pub mod telemetry;
pub mod traffic;

// Re-exports for convenience
pub use config::Config;
pub use crate::core::{CongestionQuery, CongestionScope, Engine, EventBus, IngestOutcome, Scheduler, Snapshot};
pub use db::{Database, Persistence};
pub use detection::{CrashEvent, CrashStatus, Severity, TheftEvent, TheftStatus};
pub use error::{CoreError, Result, StoreError};
pub use registry::{Actor, InMemoryRegistry, Role, VehicleRegistry};
pub use routes::{Route, RouteMatch, TripCompletion, Waypoint};
pub use simulator::FleetSimulator;
pub use spatial::{GeoPoint, GridCellId, GridIndexer};
pub use telemetry::{SampleInput, TelemetrySample};

/// RoadSense version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// RoadSense name
pub const NAME: &str = "RoadSense";
