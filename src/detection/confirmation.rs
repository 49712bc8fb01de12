// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Crash confirmation state machine
//!
//! A crash starts in `AwaitingConfirmation`. The owner (or a reviewer) can
//! answer before the deadline; otherwise the sweep or a late answer escalates
//! it. Both paths take the event's mutex and re-check the status, so only one
//! of them ever leaves `AwaitingConfirmation`.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{CrashEvent, CrashStatus, EventBook};
use crate::core::{EventBus, EventRef, EventType, NotificationChannel};
use crate::db::Persistence;
use crate::error::{CoreError, Result};
use crate::registry::{Actor, VehicleRegistry};

const EMERGENCY_CHANNELS: [NotificationChannel; 3] = [
    NotificationChannel::Ambulance,
    NotificationChannel::Police,
    NotificationChannel::NearbyVehicles,
];

pub struct ConfirmationMachine {
    book: Arc<EventBook>,
    registry: Arc<dyn VehicleRegistry>,
    store: Arc<dyn Persistence>,
    bus: Arc<EventBus>,
}

impl ConfirmationMachine {
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

    /// Owner answer to "was this a crash?".
    ///
    /// A late answer escalates the crash and still returns `DeadlineExceeded`.
    pub fn confirm(&self, crash_id: Uuid, actor: &Actor, is_crash: bool, now: DateTime<Utc>) -> Result<CrashEvent> {
        let shared = self
            .book
            .crash(&crash_id)
            .ok_or_else(|| CoreError::not_found("crash", crash_id))?;
        let mut crash = shared.lock();

        let owned = self
            .registry
            .vehicle(&crash.vehicle_id)
            .map(|v| actor.owns(&v))
            .unwrap_or(false);
        if !owned && !actor.is_reviewer() {
            return Err(CoreError::Forbidden(format!(
                "{} may not confirm crashes of {}",
                actor.user_id, crash.vehicle_id
            )));
        }

        if !crash.is_awaiting() {
            return Err(CoreError::InvalidState(format!(
                "crash {} is {:?}, not awaiting confirmation",
                crash_id, crash.status
            )));
        }

        if crash.deadline_passed(now) {
            let deadline = crash.confirmation_deadline;
            let mut staged = crash.clone();
            staged.escalate(false, now);
            self.store.store_crash(&staged).map_err(|e| {
                error!(crash = %crash_id, "Failed to persist late escalation: {}", e);
                e
            })?;
            *crash = staged.clone();
            drop(crash);

            warn!(crash = %crash_id, vehicle = %staged.vehicle_id, "Confirmation after deadline, escalating");
            self.dispatch(&staged, now);
            return Err(CoreError::DeadlineExceeded { crash_id, deadline });
        }

        let mut staged = crash.clone();
        staged.record_response(now);
        if is_crash {
            staged.escalate(true, now);
        } else {
            staged.status = CrashStatus::FalseAlarm;
            staged.user_confirmed = true;
            staged.updated_at = now;
        }

        self.store.store_crash(&staged).map_err(|e| {
            error!(crash = %crash_id, "Failed to persist confirmation: {}", e);
            e
        })?;
        *crash = staged.clone();
        drop(crash);

        if is_crash {
            info!(crash = %crash_id, vehicle = %staged.vehicle_id, "Crash confirmed by {}", actor.user_id);
            self.dispatch(&staged, now);
        } else {
            info!(crash = %crash_id, vehicle = %staged.vehicle_id, "Crash dismissed as false alarm");
            self.registry.set_active(&staged.vehicle_id, true);
            self.bus.publish_crash(EventType::CrashUpdated, staged.clone());
        }

        Ok(staged)
    }

    /// Escalate every awaiting crash whose deadline passed before `now`.
    ///
    /// A crash whose write fails stays awaiting and is retried on the next sweep.
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<CrashEvent> {
        let mut escalated = Vec::new();

        for shared in self.book.overdue_crashes(now) {
            let mut crash = shared.lock();
            if !crash.is_awaiting() || !crash.deadline_passed(now) {
                continue;
            }

            let mut staged = crash.clone();
            staged.escalate(false, now);
            if let Err(e) = self.store.store_crash(&staged) {
                error!(crash = %staged.id, "Failed to persist escalation: {}", e);
                continue;
            }
            *crash = staged.clone();
            drop(crash);

            warn!(
                crash = %staged.id,
                vehicle = %staged.vehicle_id,
                severity = ?staged.severity,
                "No confirmation within window, emergency services notified"
            );
            self.dispatch(&staged, now);
            escalated.push(staged);
        }

        escalated
    }

    fn dispatch(&self, crash: &CrashEvent, now: DateTime<Utc>) {
        self.bus
            .notify(&EMERGENCY_CHANNELS, &crash.vehicle_id, EventRef::Crash(crash.id), crash.location, now);
        self.bus.publish_crash(EventType::CrashUpdated, crash.clone());
    }
}
