// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Event bus for inter-component communication

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::detection::{CrashEvent, TheftEvent};
use crate::routes::Route;
use crate::spatial::GeoPoint;
use crate::telemetry::TelemetrySample;

/// Event types in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventType {
    CrashDetected,
    CrashUpdated,
    TheftDetected,
    TheftUpdated,
    RoutePromoted,
    SystemStatus,
}

/// Generic event wrapper
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: u64,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize)]
pub enum EventPayload {
    Crash(CrashEvent),
    Theft(TheftEvent),
    Route(Route),
    Status { key: String, value: String },
}

/// Who a notification is meant for. Delivery happens outside the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NotificationChannel {
    Ambulance,
    Police,
    NearbyVehicles,
    Owner,
}

/// Event a notification refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventRef {
    Crash(Uuid),
    Theft(Uuid),
}

/// Request for an external party to be told about an event
#[derive(Debug, Clone, Serialize)]
pub struct NotificationIntent {
    pub channel: NotificationChannel,
    pub vehicle_id: String,
    pub subject: EventRef,
    pub location: GeoPoint,
    pub issued_at: DateTime<Utc>,
}

/// Central event bus for pub/sub communication
pub struct EventBus {
    sample_tx: broadcast::Sender<TelemetrySample>,
    notification_tx: broadcast::Sender<NotificationIntent>,
    event_tx: broadcast::Sender<Event>,
    event_counter: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sample_tx, _) = broadcast::channel(capacity);
        let (notification_tx, _) = broadcast::channel(capacity);
        let (event_tx, _) = broadcast::channel(capacity);

        Self {
            sample_tx,
            notification_tx,
            event_tx,
            event_counter: AtomicU64::new(0),
        }
    }

    pub fn publish_sample(&self, sample: TelemetrySample) {
        let _ = self.sample_tx.send(sample);
    }

    pub fn publish_crash(&self, event_type: EventType, crash: CrashEvent) {
        self.publish_event(event_type, EventPayload::Crash(crash));
    }

    pub fn publish_theft(&self, event_type: EventType, theft: TheftEvent) {
        self.publish_event(event_type, EventPayload::Theft(theft));
    }

    pub fn publish_route(&self, route: Route) {
        self.publish_event(EventType::RoutePromoted, EventPayload::Route(route));
    }

    pub fn publish_status(&self, key: &str, value: &str) {
        self.publish_event(
            EventType::SystemStatus,
            EventPayload::Status {
                key: key.to_string(),
                value: value.to_string(),
            },
        );
    }

    /// Emit one intent per channel
    pub fn notify(
        &self,
        channels: &[NotificationChannel],
        vehicle_id: &str,
        subject: EventRef,
        location: GeoPoint,
        issued_at: DateTime<Utc>,
    ) {
        for channel in channels {
            let _ = self.notification_tx.send(NotificationIntent {
                channel: *channel,
                vehicle_id: vehicle_id.to_string(),
                subject,
                location,
                issued_at,
            });
        }
    }

    fn publish_event(&self, event_type: EventType, payload: EventPayload) {
        let id = self.event_counter.fetch_add(1, Ordering::Relaxed);
        let event = Event {
            id,
            event_type,
            timestamp: Utc::now(),
            payload,
        };
        let _ = self.event_tx.send(event);
    }

    pub fn subscribe_samples(&self) -> broadcast::Receiver<TelemetrySample> {
        self.sample_tx.subscribe()
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<NotificationIntent> {
        self.notification_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notify_fans_out_per_channel() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe_notifications();
        let id = Uuid::new_v4();

        bus.notify(
            &[NotificationChannel::Owner, NotificationChannel::Police],
            "V1",
            EventRef::Theft(id),
            GeoPoint::new(28.6, 77.2),
            Utc::now(),
        );

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.channel, NotificationChannel::Owner);
        assert_eq!(second.channel, NotificationChannel::Police);
        assert_eq!(second.subject, EventRef::Theft(id));
    }

    #[tokio::test]
    async fn test_event_ids_increase() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe_events();
        bus.publish_status("engine", "started");
        bus.publish_status("engine", "stopped");

        let a = rx.recv().await.unwrap();
        let b = rx.recv().await.unwrap();
        assert!(b.id > a.id);
        assert_eq!(a.event_type, EventType::SystemStatus);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        bus.publish_status("k", "v");
    }
}
