// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Main telemetry engine

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{EventBus, EventRef, EventType, NotificationChannel, Scheduler, SystemState};
use crate::config::Config;
use crate::db::Persistence;
use crate::detection::{
    ConfirmationMachine, CrashDetector, CrashEvent, CrashFilter, CrashSignature, CrashStatus, EventBook,
    ReviewDesk, TheftDetector, TheftEvent, TheftFilter, TheftSignature, TheftStatus,
};
use crate::error::{CoreError, Result};
use crate::registry::{Actor, VehicleRegistry};
use crate::routes::{Route, RouteMatch, RouteMatcher, TripCompletion};
use crate::spatial::GeoPoint;
use crate::telemetry::{SampleHistory, SampleInput, TelemetrySample};
use crate::traffic::{CongestionAggregator, CongestionReport, UsageHeatmap};

const BUS_CAPACITY: usize = 1024;

/// Result of ingesting one sample
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub sample: TelemetrySample,
    pub crash_detected: bool,
    pub theft_detected: bool,
    pub crash: Option<CrashEvent>,
    pub theft: Option<TheftEvent>,
}

/// Spatial scope of a congestion query
#[derive(Debug, Clone, PartialEq)]
pub enum CongestionScope {
    /// Every populated cell
    Area,
    /// Straight line between a known route's endpoints
    Route(String),
    /// Straight line between two points
    Path { start: GeoPoint, end: GeoPoint },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CongestionQuery {
    pub scope: CongestionScope,
    /// Minutes; defaults to the general or route window of the scope
    pub window_mins: Option<i64>,
}

impl CongestionQuery {
    pub fn area() -> Self {
        Self {
            scope: CongestionScope::Area,
            window_mins: None,
        }
    }

    pub fn path(start: GeoPoint, end: GeoPoint) -> Self {
        Self {
            scope: CongestionScope::Path { start, end },
            window_mins: None,
        }
    }

    pub fn route(route_id: &str) -> Self {
        Self {
            scope: CongestionScope::Route(route_id.to_string()),
            window_mins: None,
        }
    }

    pub fn with_window(mut self, minutes: i64) -> Self {
        self.window_mins = Some(minutes);
        self
    }
}

/// Records loaded from storage at start-up
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub routes: Vec<Route>,
    pub crashes: Vec<CrashEvent>,
    pub thefts: Vec<TheftEvent>,
}

/// Main engine. All calls are synchronous and bounded; the async side is
/// limited to the scheduler built by [`Engine::scheduler`].
pub struct Engine {
    config: Arc<Config>,
    registry: Arc<dyn VehicleRegistry>,
    store: Arc<dyn Persistence>,
    bus: Arc<EventBus>,
    history: SampleHistory,
    crash_detector: CrashDetector,
    theft_detector: TheftDetector,
    events: Arc<EventBook>,
    confirmation: ConfirmationMachine,
    review: ReviewDesk,
    congestion: CongestionAggregator,
    routes: RouteMatcher,
    journeys: RwLock<HashMap<String, String>>,
    state: RwLock<SystemState>,
    start_time: Instant,
}

impl Engine {
    pub fn new(config: Config, registry: Arc<dyn VehicleRegistry>, store: Arc<dyn Persistence>) -> Result<Self> {
        Self::restore(config, registry, store, Snapshot::default())
    }

    /// Build an engine around previously stored routes and events
    pub fn restore(
        config: Config,
        registry: Arc<dyn VehicleRegistry>,
        store: Arc<dyn Persistence>,
        snapshot: Snapshot,
    ) -> Result<Self> {
        config.validate().map_err(|e| CoreError::Validation(e.to_string()))?;
        let retention = Duration::try_minutes(config.history.retention_mins)
            .ok_or_else(|| CoreError::Validation("history.retention_mins out of range".into()))?;
        let config = Arc::new(config);
        let bus = Arc::new(EventBus::new(BUS_CAPACITY));
        let events = Arc::new(EventBook::new());

        let (crashes, thefts) = (snapshot.crashes.len(), snapshot.thefts.len());
        for crash in snapshot.crashes {
            events.restore_crash(crash);
        }
        for theft in snapshot.thefts {
            events.restore_theft(theft);
        }

        let routes = RouteMatcher::with_routes(config.routes.clone(), store.clone(), snapshot.routes);
        info!(
            "Engine restored {} routes, {} crashes, {} thefts",
            routes.len(),
            crashes,
            thefts
        );

        Ok(Self {
            history: SampleHistory::new(retention),
            crash_detector: CrashDetector::new(config.crash.clone()),
            theft_detector: TheftDetector::new(config.theft.clone()),
            confirmation: ConfirmationMachine::new(events.clone(), registry.clone(), store.clone(), bus.clone()),
            review: ReviewDesk::new(events.clone(), registry.clone(), store.clone(), bus.clone()),
            congestion: CongestionAggregator::new(config.congestion.clone())?,
            routes,
            journeys: RwLock::new(HashMap::new()),
            state: RwLock::new(SystemState::default()),
            start_time: Instant::now(),
            config,
            registry,
            store,
            bus,
            events,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    pub fn history(&self) -> &SampleHistory {
        &self.history
    }

    pub fn start(&self) {
        info!("Starting telemetry engine...");
        self.state.write().running = true;
        self.bus.publish_status("engine", "running");
    }

    pub fn stop(&self) {
        info!("Stopping telemetry engine...");
        self.state.write().running = false;
        self.bus.publish_status("engine", "stopped");
    }

    // ------------------------------------------------------------------
    // Ingestion

    pub fn ingest(&self, input: SampleInput) -> Result<IngestOutcome> {
        self.ingest_at(input, Utc::now())
    }

    /// Validate, record and run both detectors on one sample.
    ///
    /// The device lane stays locked from reading the prior sample until both
    /// detectors ran, so samples of one device are evaluated in sequence.
    pub fn ingest_at(&self, input: SampleInput, now: DateTime<Utc>) -> Result<IngestOutcome> {
        input.validate()?;
        let vehicle_id = self
            .registry
            .resolve_device(&input.device_id)
            .ok_or_else(|| CoreError::not_found("device", &input.device_id))?;
        let sample = TelemetrySample::record(input, &vehicle_id, now);

        let lane = self.history.lane(&sample.device_id);
        let mut lane = lane.lock();

        self.store.store_sample(&sample).map_err(|e| {
            error!(device = %sample.device_id, "Failed to persist sample: {}", e);
            e
        })?;

        let prior = lane
            .iter()
            .rev()
            .find(|p| p.timestamp <= sample.timestamp)
            .cloned();
        self.history.append(&mut lane, sample.clone());
        self.registry.touch_device(&sample.device_id, now);

        let crash = prior
            .and_then(|p| self.crash_detector.evaluate(&p, &sample))
            .and_then(|sig| self.open_crash(&sample, &sig, now));
        let theft = self
            .theft_detector
            .evaluate(&sample, &lane)
            .and_then(|sig| self.open_theft(&sample, &sig, now));
        drop(lane);

        {
            let mut state = self.state.write();
            state.samples_ingested += 1;
            if crash.is_some() {
                state.crashes_detected += 1;
            }
            if theft.is_some() {
                state.thefts_detected += 1;
            }
            if crash.is_some() || theft.is_some() {
                state.last_detection = Some(now);
            }
        }

        self.bus.publish_sample(sample.clone());
        Ok(IngestOutcome {
            sample,
            crash_detected: crash.is_some(),
            theft_detected: theft.is_some(),
            crash,
            theft,
        })
    }

    /// Detected events are kept even if their first write fails; the next
    /// transition upserts the full record.
    fn open_crash(&self, sample: &TelemetrySample, sig: &CrashSignature, now: DateTime<Utc>) -> Option<CrashEvent> {
        let journey_id = self.journeys.read().get(&sample.vehicle_id).cloned();
        let window = Duration::seconds(self.config.confirmation.window_secs);
        let crash = CrashEvent::open(sample, sig, journey_id, now, window);

        if !self.events.open_crash(crash.clone(), self.config.crash.suppress_while_open) {
            debug!(vehicle = %sample.vehicle_id, "Crash signature while a crash is awaiting confirmation");
            return None;
        }
        if let Err(e) = self.store.store_crash(&crash) {
            error!(crash = %crash.id, "Failed to persist crash event: {}", e);
        }
        self.registry.set_active(&crash.vehicle_id, false);

        warn!(
            crash = %crash.id,
            vehicle = %crash.vehicle_id,
            severity = ?crash.severity,
            "Crash detected at {:.2} g, awaiting confirmation until {}",
            crash.g_force,
            crash.confirmation_deadline
        );
        self.bus.publish_crash(EventType::CrashDetected, crash.clone());
        Some(crash)
    }

    fn open_theft(&self, sample: &TelemetrySample, sig: &TheftSignature, now: DateTime<Utc>) -> Option<TheftEvent> {
        let theft = TheftEvent::open(sample, sig, now);

        if !self.events.open_theft(theft.clone(), self.config.theft.suppress_while_open) {
            debug!(vehicle = %sample.vehicle_id, "Theft signature while a theft is unresolved");
            return None;
        }
        if let Err(e) = self.store.store_theft(&theft) {
            error!(theft = %theft.id, "Failed to persist theft event: {}", e);
        }
        self.registry.set_active(&theft.vehicle_id, false);

        warn!(
            theft = %theft.id,
            vehicle = %theft.vehicle_id,
            "Theft detected: moving at {:.2} m/s for {}s while parked",
            theft.speed_detected,
            theft.duration_seconds
        );
        self.bus.notify(
            &[NotificationChannel::Owner, NotificationChannel::Police],
            &theft.vehicle_id,
            EventRef::Theft(theft.id),
            theft.location,
            now,
        );
        self.bus.publish_theft(EventType::TheftDetected, theft.clone());
        Some(theft)
    }

    // ------------------------------------------------------------------
    // Crash and theft lifecycle

    pub fn confirm_crash(&self, crash_id: Uuid, actor: &Actor, is_crash: bool) -> Result<CrashEvent> {
        self.confirm_crash_at(crash_id, actor, is_crash, Utc::now())
    }

    pub fn confirm_crash_at(
        &self,
        crash_id: Uuid,
        actor: &Actor,
        is_crash: bool,
        now: DateTime<Utc>,
    ) -> Result<CrashEvent> {
        let result = self.confirmation.confirm(crash_id, actor, is_crash, now);
        if matches!(result, Err(CoreError::DeadlineExceeded { .. })) {
            self.state.write().escalations += 1;
        }
        result
    }

    /// Escalate overdue crashes; returns the ones escalated by this call
    pub fn sweep_deadlines(&self, now: DateTime<Utc>) -> Vec<CrashEvent> {
        let escalated = self.confirmation.sweep(now);
        if !escalated.is_empty() {
            self.state.write().escalations += escalated.len() as u64;
        }
        escalated
    }

    pub fn review_crash(
        &self,
        crash_id: Uuid,
        actor: &Actor,
        status: Option<CrashStatus>,
        notes: Option<&str>,
    ) -> Result<CrashEvent> {
        self.review.review_crash(crash_id, actor, status, notes, Utc::now())
    }

    pub fn review_theft(
        &self,
        theft_id: Uuid,
        actor: &Actor,
        status: Option<TheftStatus>,
        notes: Option<&str>,
    ) -> Result<TheftEvent> {
        self.review.review_theft(theft_id, actor, status, notes, Utc::now())
    }

    pub fn crash_events(&self, actor: &Actor, filter: &CrashFilter) -> Result<Vec<CrashEvent>> {
        self.review.crashes(actor, filter)
    }

    pub fn theft_events(&self, actor: &Actor, filter: &TheftFilter) -> Result<Vec<TheftEvent>> {
        self.review.thefts(actor, filter)
    }

    // ------------------------------------------------------------------
    // Traffic

    pub fn congestion(&self, query: &CongestionQuery, now: DateTime<Utc>) -> Result<CongestionReport> {
        let cfg = &self.config.congestion;
        let default_window = match query.scope {
            CongestionScope::Area => cfg.general_window_mins,
            _ => cfg.route_window_mins,
        };
        let minutes = query.window_mins.unwrap_or(default_window);
        if minutes <= 0 {
            return Err(CoreError::Validation(format!("window must be positive, got {} min", minutes)));
        }
        let retention = self.config.history.retention_mins;
        if minutes > retention {
            return Err(CoreError::Validation(format!(
                "window of {} min exceeds the {} min sample retention",
                minutes, retention
            )));
        }
        let window = Duration::try_minutes(minutes)
            .ok_or_else(|| CoreError::Validation(format!("window of {} min is out of range", minutes)))?;

        match &query.scope {
            CongestionScope::Area => Ok(self.congestion.area(&self.history, window, now)),
            CongestionScope::Route(route_id) => {
                let route = self
                    .routes
                    .route(route_id)
                    .ok_or_else(|| CoreError::not_found("route", route_id))?;
                Ok(self
                    .congestion
                    .path(&self.history, &route.start.point, &route.end.point, window, now))
            }
            CongestionScope::Path { start, end } => {
                if !start.is_valid() || !end.is_valid() {
                    return Err(CoreError::Validation("path endpoints out of range".into()));
                }
                Ok(self.congestion.path(&self.history, start, end, window, now))
            }
        }
    }

    /// Recompute the general congestion window into the per-cell cache
    pub fn refresh_congestion(&self, now: DateTime<Utc>) -> usize {
        self.congestion.refresh(&self.history, now)
    }

    pub fn usage_heatmap(
        &self,
        vehicle_id: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<UsageHeatmap> {
        if from > to {
            return Err(CoreError::Validation("heat map range ends before it starts".into()));
        }
        if let Some(v) = vehicle_id {
            if self.registry.vehicle(v).is_none() {
                return Err(CoreError::not_found("vehicle", v));
            }
        }
        Ok(UsageHeatmap::build(self.congestion.grid(), &self.history, vehicle_id, from, to))
    }

    // ------------------------------------------------------------------
    // Journeys and routes

    /// Remember the active journey so crashes can reference it
    pub fn begin_journey(&self, vehicle_id: &str, journey_id: &str) -> Result<()> {
        if self.registry.vehicle(vehicle_id).is_none() {
            return Err(CoreError::not_found("vehicle", vehicle_id));
        }
        if journey_id.trim().is_empty() {
            return Err(CoreError::Validation("journey_id is required".into()));
        }
        self.journeys
            .write()
            .insert(vehicle_id.to_string(), journey_id.to_string());
        debug!(vehicle = %vehicle_id, "Journey {} started", journey_id);
        Ok(())
    }

    pub fn active_journey(&self, vehicle_id: &str) -> Option<String> {
        self.journeys.read().get(vehicle_id).cloned()
    }

    pub fn complete_trip(&self, trip: &TripCompletion) -> Result<Option<RouteMatch>> {
        self.complete_trip_at(trip, Utc::now())
    }

    /// Close the vehicle's journey and feed the trip to the route matcher.
    ///
    /// Returns `None` for vehicles whose class does not take part in route
    /// discovery. A storage failure leaves the journey open so the call can be
    /// retried.
    pub fn complete_trip_at(&self, trip: &TripCompletion, now: DateTime<Utc>) -> Result<Option<RouteMatch>> {
        trip.validate()?;
        let vehicle = self
            .registry
            .vehicle(&trip.vehicle_id)
            .ok_or_else(|| CoreError::not_found("vehicle", &trip.vehicle_id))?;

        let result = if vehicle.is_route_eligible() {
            let matched = self.routes.complete_trip(trip, now)?;
            if matched.promoted {
                self.bus.publish_route(matched.route.clone());
            }
            Some(matched)
        } else {
            debug!(vehicle = %trip.vehicle_id, "Trip from {:?} vehicle skipped for routes", vehicle.class);
            None
        };

        let mut journeys = self.journeys.write();
        let closes = match (&trip.journey_id, journeys.get(&trip.vehicle_id)) {
            (Some(done), Some(active)) => done == active,
            (None, Some(_)) => true,
            _ => false,
        };
        if closes {
            journeys.remove(&trip.vehicle_id);
        }

        Ok(result)
    }

    pub fn routes(&self) -> Vec<Route> {
        self.routes.routes()
    }

    pub fn public_routes(&self) -> Vec<Route> {
        self.routes.public_routes()
    }

    pub fn route(&self, route_id: &str) -> Result<Route> {
        self.routes
            .route(route_id)
            .ok_or_else(|| CoreError::not_found("route", route_id))
    }

    // ------------------------------------------------------------------
    // Housekeeping

    pub fn prune_history(&self, now: DateTime<Utc>) -> usize {
        self.history.prune(now)
    }

    pub fn state(&self) -> SystemState {
        let mut state = self.state.read().clone();
        state.devices_tracked = self.history.device_count();
        state.routes_known = self.routes.len();
        state.public_routes = self.routes.public_routes().len();
        state.uptime_seconds = self.uptime();
        state
    }

    pub fn uptime(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Scheduler with the engine's periodic tasks registered
    pub async fn scheduler(self: &Arc<Self>) -> Scheduler {
        let scheduler = Scheduler::new();
        let cfg = &self.config;

        let engine = self.clone();
        scheduler
            .add_task(
                "deadline-sweep",
                std::time::Duration::from_millis(cfg.confirmation.sweep_interval_ms),
                move || {
                    engine.sweep_deadlines(Utc::now());
                },
            )
            .await;

        let engine = self.clone();
        scheduler
            .add_task(
                "congestion-refresh",
                std::time::Duration::from_secs(cfg.congestion.refresh_interval_secs),
                move || {
                    let cells = engine.refresh_congestion(Utc::now());
                    debug!("Congestion cache refreshed for {} cells", cells);
                },
            )
            .await;

        let engine = self.clone();
        scheduler
            .add_task(
                "history-prune",
                std::time::Duration::from_secs(cfg.history.prune_interval_secs),
                move || {
                    engine.prune_history(Utc::now());
                },
            )
            .await;

        scheduler
    }
}
