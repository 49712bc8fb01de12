// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Reviewer transitions and role-scoped event listings

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use super::{CrashEvent, CrashStatus, EventBook, Severity, TheftEvent, TheftStatus};
use crate::core::{EventBus, EventType};
use crate::db::Persistence;
use crate::error::{CoreError, Result};
use crate::registry::{Actor, Role, VehicleRegistry};

#[derive(Debug, Clone, Default)]
pub struct CrashFilter {
    pub vehicle_id: Option<String>,
    pub status: Option<CrashStatus>,
    pub severity: Option<Severity>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl CrashFilter {
    pub fn matches(&self, crash: &CrashEvent) -> bool {
        self.vehicle_id.as_ref().map_or(true, |v| *v == crash.vehicle_id)
            && self.status.map_or(true, |s| s == crash.status)
            && self.severity.map_or(true, |s| s == crash.severity)
            && self.since.map_or(true, |t| crash.detected_at >= t)
            && self.until.map_or(true, |t| crash.detected_at <= t)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TheftFilter {
    pub vehicle_id: Option<String>,
    pub status: Option<TheftStatus>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl TheftFilter {
    pub fn matches(&self, theft: &TheftEvent) -> bool {
        self.vehicle_id.as_ref().map_or(true, |v| *v == theft.vehicle_id)
            && self.status.map_or(true, |s| s == theft.status)
            && self.since.map_or(true, |t| theft.detected_at >= t)
            && self.until.map_or(true, |t| theft.detected_at <= t)
    }
}

/// Administrative actions by police and admins
pub struct ReviewDesk {
    book: Arc<EventBook>,
    registry: Arc<dyn VehicleRegistry>,
    store: Arc<dyn Persistence>,
    bus: Arc<EventBus>,
}

impl ReviewDesk {
    pub fn new(
        book: Arc<EventBook>,
        registry: Arc<dyn VehicleRegistry>,
        store: Arc<dyn Persistence>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            book,
            registry,
            store,
            bus,
        }
    }

    fn require_reviewer(actor: &Actor) -> Result<()> {
        if actor.is_reviewer() {
            Ok(())
        } else {
            Err(CoreError::Forbidden(format!("{} is not a reviewer", actor.user_id)))
        }
    }

    /// Reviewer may move a crash to CONFIRMED, RESOLVED or FALSE_ALARM and
    /// replace its notes. Terminal crashes can no longer change status.
    pub fn review_crash(
        &self,
        crash_id: Uuid,
        actor: &Actor,
        status: Option<CrashStatus>,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<CrashEvent> {
        Self::require_reviewer(actor)?;
        let shared = self
            .book
            .crash(&crash_id)
            .ok_or_else(|| CoreError::not_found("crash", crash_id))?;
        let mut crash = shared.lock();

        let mut staged = crash.clone();
        if let Some(target) = status {
            if !matches!(
                target,
                CrashStatus::Confirmed | CrashStatus::Resolved | CrashStatus::FalseAlarm
            ) {
                return Err(CoreError::InvalidState(format!("reviewers cannot set {:?}", target)));
            }
            if crash.status.is_terminal() {
                return Err(CoreError::InvalidState(format!(
                    "crash {} is already {:?}",
                    crash_id, crash.status
                )));
            }
            staged.status = target;
        }
        if let Some(notes) = notes.filter(|n| !n.is_empty()) {
            staged.notes = notes.to_string();
        }
        staged.updated_at = now;

        self.store.store_crash(&staged).map_err(|e| {
            error!(crash = %crash_id, "Failed to persist review: {}", e);
            e
        })?;
        *crash = staged.clone();
        drop(crash);

        if staged.status == CrashStatus::FalseAlarm {
            self.registry.set_active(&staged.vehicle_id, true);
        }
        info!(crash = %crash_id, status = ?staged.status, "Crash reviewed by {}", actor.user_id);
        self.bus.publish_crash(EventType::CrashUpdated, staged.clone());
        Ok(staged)
    }

    /// Reviewer may move a theft to CONFIRMED, FALSE_ALARM or RECOVERED.
    /// Clearing a theft reactivates the vehicle.
    pub fn review_theft(
        &self,
        theft_id: Uuid,
        actor: &Actor,
        status: Option<TheftStatus>,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<TheftEvent> {
        Self::require_reviewer(actor)?;
        let shared = self
            .book
            .theft(&theft_id)
            .ok_or_else(|| CoreError::not_found("theft", theft_id))?;
        let mut theft = shared.lock();

        let mut staged = theft.clone();
        if let Some(target) = status {
            if target == TheftStatus::Detected {
                return Err(CoreError::InvalidState("reviewers cannot set Detected".into()));
            }
            if !theft.status.is_unresolved() {
                return Err(CoreError::InvalidState(format!(
                    "theft {} is already {:?}",
                    theft_id, theft.status
                )));
            }
            staged.status = target;
        }
        if let Some(notes) = notes.filter(|n| !n.is_empty()) {
            staged.notes = notes.to_string();
        }
        staged.updated_at = now;

        self.store.store_theft(&staged).map_err(|e| {
            error!(theft = %theft_id, "Failed to persist review: {}", e);
            e
        })?;
        *theft = staged.clone();
        drop(theft);

        if !staged.status.is_unresolved() {
            self.registry.set_active(&staged.vehicle_id, true);
        }
        info!(theft = %theft_id, status = ?staged.status, "Theft reviewed by {}", actor.user_id);
        self.bus.publish_theft(EventType::TheftUpdated, staged.clone());
        Ok(staged)
    }

    fn visible_to(&self, actor: &Actor, vehicle_id: &str) -> bool {
        actor.is_reviewer()
            || self
                .registry
                .vehicle(vehicle_id)
                .map(|v| actor.owns(&v))
                .unwrap_or(false)
    }

    fn require_listing_rights(actor: &Actor) -> Result<()> {
        match actor.role {
            Role::NormalUser => Err(CoreError::Forbidden(format!("{} may not list events", actor.user_id))),
            _ => Ok(()),
        }
    }

    /// Reviewers see every crash, owners only their own vehicles', newest first
    pub fn crashes(&self, actor: &Actor, filter: &CrashFilter) -> Result<Vec<CrashEvent>> {
        Self::require_listing_rights(actor)?;
        Ok(self
            .book
            .crashes(|c| filter.matches(c) && self.visible_to(actor, &c.vehicle_id)))
    }

    /// Reviewers see every theft, owners only their own vehicles', newest first
    pub fn thefts(&self, actor: &Actor, filter: &TheftFilter) -> Result<Vec<TheftEvent>> {
        Self::require_listing_rights(actor)?;
        Ok(self
            .book
            .thefts(|t| filter.matches(t) && self.visible_to(actor, &t.vehicle_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::detection::{CrashSignature, TheftSignature};
    use crate::registry::{InMemoryRegistry, VehicleClass};
    use crate::telemetry::{SampleInput, TelemetrySample};
    use chrono::Duration;

    struct Fixture {
        desk: ReviewDesk,
        book: Arc<EventBook>,
        registry: Arc<InMemoryRegistry>,
    }

    fn fixture() -> Fixture {
        let book = Arc::new(EventBook::new());
        let registry = Arc::new(InMemoryRegistry::new());
        registry.add_vehicle("V1", Some("alice"), VehicleClass::Private);
        registry.add_vehicle("V2", Some("bob"), VehicleClass::Government);
        let store = Arc::new(Database::open_in_memory().unwrap());
        let bus = Arc::new(EventBus::new(64));
        let desk = ReviewDesk::new(book.clone(), registry.clone(), store, bus);
        Fixture { desk, book, registry }
    }

    fn sample(vehicle: &str, ts: DateTime<Utc>) -> TelemetrySample {
        TelemetrySample::record(SampleInput::new("d", ts, 28.6, 77.2), vehicle, ts)
    }

    fn add_crash(f: &Fixture, vehicle: &str, severity: Severity, ts: DateTime<Utc>) -> Uuid {
        let sig = CrashSignature {
            accel_magnitude: 80.0,
            g_force: 8.2,
            speed_before: 25.0,
            speed_after: 1.0,
            speed_drop_percent: 96.0,
            severity,
        };
        let crash = CrashEvent::open(&sample(vehicle, ts), &sig, None, ts, Duration::seconds(15));
        let id = crash.id;
        f.book.open_crash(crash, false);
        id
    }

    fn add_theft(f: &Fixture, vehicle: &str, ts: DateTime<Utc>) -> Uuid {
        let sig = TheftSignature {
            speed_detected: 3.0,
            moving_samples: 6,
            duration_seconds: 10,
        };
        let theft = TheftEvent::open(&sample(vehicle, ts), &sig, ts);
        let id = theft.id;
        f.book.open_theft(theft, false);
        id
    }

    fn police() -> Actor {
        Actor::new("officer", Role::Police)
    }

    #[test]
    fn test_reviewer_resolves_crash() {
        let f = fixture();
        let now = Utc::now();
        let id = add_crash(&f, "V1", Severity::Critical, now);

        let crash = f
            .desk
            .review_crash(id, &police(), Some(CrashStatus::Confirmed), Some("officers on scene"), now)
            .unwrap();
        assert_eq!(crash.status, CrashStatus::Confirmed);
        assert_eq!(crash.notes, "officers on scene");

        let crash = f.desk.review_crash(id, &police(), Some(CrashStatus::Resolved), None, now).unwrap();
        assert_eq!(crash.status, CrashStatus::Resolved);
        assert_eq!(crash.notes, "officers on scene");

        let err = f
            .desk
            .review_crash(id, &police(), Some(CrashStatus::Confirmed), None, now)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
    }

    #[test]
    fn test_crash_review_rules() {
        let f = fixture();
        let now = Utc::now();
        let id = add_crash(&f, "V1", Severity::High, now);

        let owner = Actor::new("alice", Role::PrivateOwner);
        let err = f.desk.review_crash(id, &owner, Some(CrashStatus::Resolved), None, now).unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));

        let err = f
            .desk
            .review_crash(id, &police(), Some(CrashStatus::AwaitingConfirmation), None, now)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));

        f.registry.set_active("V1", false);
        f.desk.review_crash(id, &police(), Some(CrashStatus::FalseAlarm), None, now).unwrap();
        assert_eq!(f.registry.is_active("V1"), Some(true));
    }

    #[test]
    fn test_theft_recovery_reactivates() {
        let f = fixture();
        let now = Utc::now();
        let id = add_theft(&f, "V2", now);
        f.registry.set_active("V2", false);

        let admin = Actor::new("root", Role::Admin);
        let theft = f.desk.review_theft(id, &admin, Some(TheftStatus::Confirmed), None, now).unwrap();
        assert_eq!(theft.status, TheftStatus::Confirmed);
        assert_eq!(f.registry.is_active("V2"), Some(false));

        f.desk.review_theft(id, &admin, Some(TheftStatus::Recovered), Some("found"), now).unwrap();
        assert_eq!(f.registry.is_active("V2"), Some(true));

        let err = f.desk.review_theft(id, &admin, Some(TheftStatus::Confirmed), None, now).unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
    }

    #[test]
    fn test_theft_listing_is_role_scoped() {
        let f = fixture();
        let now = Utc::now();
        add_theft(&f, "V1", now - Duration::minutes(5));
        add_theft(&f, "V2", now);
        add_theft(&f, "V1", now);

        assert_eq!(f.desk.thefts(&police(), &TheftFilter::default()).unwrap().len(), 3);

        let alice = Actor::new("alice", Role::PrivateOwner);
        let mine = f.desk.thefts(&alice, &TheftFilter::default()).unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|t| t.vehicle_id == "V1"));
        assert!(mine[0].detected_at >= mine[1].detected_at);

        let nobody = Actor::new("carol", Role::NormalUser);
        assert!(matches!(
            f.desk.thefts(&nobody, &TheftFilter::default()),
            Err(CoreError::Forbidden(_))
        ));
    }

    #[test]
    fn test_crash_listing_filters() {
        let f = fixture();
        let now = Utc::now();
        add_crash(&f, "V1", Severity::Low, now - Duration::minutes(2));
        add_crash(&f, "V1", Severity::Critical, now);
        add_crash(&f, "V2", Severity::Critical, now);

        let critical = CrashFilter {
            severity: Some(Severity::Critical),
            ..Default::default()
        };
        assert_eq!(f.desk.crashes(&police(), &critical).unwrap().len(), 2);

        let v1 = CrashFilter {
            vehicle_id: Some("V1".into()),
            ..Default::default()
        };
        let listed = f.desk.crashes(&police(), &v1).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].severity, Severity::Critical);

        let bob = Actor::new("bob", Role::GovernmentOwner);
        assert_eq!(f.desk.crashes(&bob, &CrashFilter::default()).unwrap().len(), 1);
    }
}
