// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Route matcher - match-or-create over the shared route book

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::{Route, TripCompletion};
use crate::config::{AveragingMode, RouteConfig, TieBreak};
use crate::db::Persistence;
use crate::error::{CoreError, Result};

/// What a trip completion did to the route book
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Route,
    /// No existing route matched; this one was just created
    pub created: bool,
    /// The trip pushed the route over the public threshold
    pub promoted: bool,
}

struct RouteBook {
    routes: Vec<Route>,
    created: u64,
}

/// Single writer over all routes. Scan, update and create happen under one
/// lock, so concurrent trips never create duplicates or lose increments.
pub struct RouteMatcher {
    config: RouteConfig,
    store: Arc<dyn Persistence>,
    book: Mutex<RouteBook>,
}

impl RouteMatcher {
    pub fn new(config: RouteConfig, store: Arc<dyn Persistence>) -> Self {
        Self::with_routes(config, store, Vec::new())
    }

    /// Start from routes loaded out of storage, in creation order
    pub fn with_routes(config: RouteConfig, store: Arc<dyn Persistence>, routes: Vec<Route>) -> Self {
        let created = routes.len() as u64;
        Self {
            config,
            store,
            book: Mutex::new(RouteBook { routes, created }),
        }
    }

    /// Fold a completed trip into the matching route, or start a new one.
    ///
    /// Fails with `Storage` if the route cannot be persisted; the book is then
    /// unchanged and the call can be retried.
    pub fn complete_trip(&self, trip: &TripCompletion, now: DateTime<Utc>) -> Result<RouteMatch> {
        trip.validate()?;
        let mut book = self.book.lock();

        if let Some(idx) = self.find_match(&book.routes, trip) {
            let mut staged = book.routes[idx].clone();
            let was_public = staged.is_public;
            self.absorb(&mut staged, trip, now);

            self.persist(&staged)?;
            book.routes[idx] = staged.clone();
            drop(book);

            let promoted = !was_public && staged.is_public;
            if promoted {
                info!(route = %staged.route_id, trips = staged.trip_count, "Route promoted to public: {}", staged.name);
            } else {
                debug!(route = %staged.route_id, trips = staged.trip_count, "Trip matched route");
            }
            return Ok(RouteMatch {
                route: staged,
                created: false,
                promoted,
            });
        }

        let seq = book.created + 1;
        let route_id = format!("R{}_{}_{}", now.format("%Y%m%d"), trip.vehicle_id, seq);
        let route = Route::from_trip(&route_id, trip, now);

        self.persist(&route)?;
        book.created = seq;
        book.routes.push(route.clone());
        drop(book);

        info!(route = %route.route_id, "New route: {}", route.name);
        Ok(RouteMatch {
            route,
            created: true,
            promoted: false,
        })
    }

    fn persist(&self, route: &Route) -> Result<()> {
        self.store.store_route(route).map_err(|e| {
            error!(route = %route.route_id, "Failed to persist route: {}", e);
            CoreError::from(e)
        })
    }

    fn find_match(&self, routes: &[Route], trip: &TripCompletion) -> Option<usize> {
        let mut candidates = routes
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.match_distance(trip, self.config.proximity_m).map(|d| (i, d)));

        match self.config.tie_break {
            TieBreak::FirstMatch => candidates.next().map(|(i, _)| i),
            TieBreak::Nearest => candidates
                .fold(None, |best: Option<(usize, f64)>, (i, d)| match best {
                    Some((_, bd)) if bd <= d => best,
                    _ => Some((i, d)),
                })
                .map(|(i, _)| i),
        }
    }

    fn absorb(&self, route: &mut Route, trip: &TripCompletion, now: DateTime<Utc>) {
        let mode = self.config.averaging;

        route.trip_count += 1;
        if let Some(speed) = trip.effective_speed() {
            route.speed_samples += 1;
            route.average_speed = Some(blend(mode, route.average_speed, speed, route.speed_samples));
        }
        if let Some(duration) = trip.duration_secs {
            route.duration_samples += 1;
            route.average_duration = Some(blend(mode, route.average_duration, duration, route.duration_samples));
        }
        if route.trip_count >= self.config.public_threshold {
            route.is_public = true;
        }
        route.updated_at = now;
    }

    pub fn route(&self, route_id: &str) -> Option<Route> {
        self.book.lock().routes.iter().find(|r| r.route_id == route_id).cloned()
    }

    /// Every route in creation order
    pub fn routes(&self) -> Vec<Route> {
        self.book.lock().routes.clone()
    }

    /// Public routes, most travelled first
    pub fn public_routes(&self) -> Vec<Route> {
        let mut public: Vec<Route> = self.book.lock().routes.iter().filter(|r| r.is_public).cloned().collect();
        public.sort_by(|a, b| b.trip_count.cmp(&a.trip_count));
        public
    }

    pub fn len(&self) -> usize {
        self.book.lock().routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fold `new` into a running average; `n` counts `new`
fn blend(mode: AveragingMode, old: Option<f64>, new: f64, n: u32) -> f64 {
    match (mode, old) {
        (_, None) => new,
        (AveragingMode::TwoPoint, Some(old)) => (old + new) / 2.0,
        (AveragingMode::RunningMean, Some(old)) => old + (new - old) / n.max(1) as f64,
    }
}
