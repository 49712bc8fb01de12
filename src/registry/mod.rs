// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Vehicle and device registry - the identity collaborator the core consults

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Devices that pinged within this window count as healthy
pub const DEVICE_HEALTH_WINDOW_MINS: i64 = 10;

/// Who is calling into the core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Police,
    PrivateOwner,
    GovernmentOwner,
    NormalUser,
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: &str, role: Role) -> Self {
        Self {
            user_id: user_id.to_string(),
            role,
        }
    }

    /// Admins and police may review any event
    pub fn is_reviewer(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Police)
    }

    pub fn owns(&self, vehicle: &VehicleInfo) -> bool {
        vehicle.owner.as_deref() == Some(self.user_id.as_str())
    }
}

/// Registration class of a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleClass {
    Public,
    Private,
    Government,
}

/// Registry view of a vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleInfo {
    pub vehicle_id: String,
    pub owner: Option<String>,
    pub class: VehicleClass,
    pub active: bool,
}

impl VehicleInfo {
    /// Only public vehicles contribute trips to route discovery
    pub fn is_route_eligible(&self) -> bool {
        self.class == VehicleClass::Public
    }
}

/// Device health as seen by the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceHealth {
    pub device_id: String,
    pub vehicle_id: String,
    pub last_ping: Option<DateTime<Utc>>,
    pub healthy: bool,
}

/// Lookups the core needs from the external vehicle/device registry
pub trait VehicleRegistry: Send + Sync {
    /// Vehicle a device is attached to
    fn resolve_device(&self, device_id: &str) -> Option<String>;

    fn vehicle(&self, vehicle_id: &str) -> Option<VehicleInfo>;

    /// Flip the vehicle's active flag (detectors deactivate, clearances reactivate)
    fn set_active(&self, vehicle_id: &str, active: bool);

    /// Record that a device just reported
    fn touch_device(&self, device_id: &str, at: DateTime<Utc>);
}

#[derive(Debug, Clone)]
struct DeviceEntry {
    vehicle_id: String,
    last_ping: Option<DateTime<Utc>>,
}

/// Registry kept in process memory; backs demo mode and tests
#[derive(Default)]
pub struct InMemoryRegistry {
    vehicles: RwLock<HashMap<String, VehicleInfo>>,
    devices: RwLock<HashMap<String, DeviceEntry>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vehicle(&self, vehicle_id: &str, owner: Option<&str>, class: VehicleClass) {
        self.vehicles.write().insert(
            vehicle_id.to_string(),
            VehicleInfo {
                vehicle_id: vehicle_id.to_string(),
                owner: owner.map(str::to_string),
                class,
                active: true,
            },
        );
        info!("Registered vehicle {} ({:?})", vehicle_id, class);
    }

    pub fn attach_device(&self, device_id: &str, vehicle_id: &str) {
        self.devices.write().insert(
            device_id.to_string(),
            DeviceEntry {
                vehicle_id: vehicle_id.to_string(),
                last_ping: None,
            },
        );
        debug!("Attached device {} to {}", device_id, vehicle_id);
    }

    pub fn is_active(&self, vehicle_id: &str) -> Option<bool> {
        self.vehicles.read().get(vehicle_id).map(|v| v.active)
    }

    /// Health of every device as of `now`
    pub fn device_health(&self, now: DateTime<Utc>) -> Vec<DeviceHealth> {
        let threshold = now - Duration::minutes(DEVICE_HEALTH_WINDOW_MINS);
        let mut health: Vec<DeviceHealth> = self
            .devices
            .read()
            .iter()
            .map(|(id, entry)| DeviceHealth {
                device_id: id.clone(),
                vehicle_id: entry.vehicle_id.clone(),
                last_ping: entry.last_ping,
                healthy: entry.last_ping.map(|p| p >= threshold).unwrap_or(false),
            })
            .collect();
        health.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        health
    }
}

impl VehicleRegistry for InMemoryRegistry {
    fn resolve_device(&self, device_id: &str) -> Option<String> {
        self.devices.read().get(device_id).map(|d| d.vehicle_id.clone())
    }

    fn vehicle(&self, vehicle_id: &str) -> Option<VehicleInfo> {
        self.vehicles.read().get(vehicle_id).cloned()
    }

    fn set_active(&self, vehicle_id: &str, active: bool) {
        if let Some(v) = self.vehicles.write().get_mut(vehicle_id) {
            v.active = active;
        }
    }

    fn touch_device(&self, device_id: &str, at: DateTime<Utc>) {
        if let Some(d) = self.devices.write().get_mut(device_id) {
            d.last_ping = Some(d.last_ping.map_or(at, |p| p.max(at)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_and_deactivate() {
        let registry = InMemoryRegistry::new();
        registry.add_vehicle("DL01AB1234", Some("alice"), VehicleClass::Private);
        registry.attach_device("dev-1", "DL01AB1234");

        assert_eq!(registry.resolve_device("dev-1").as_deref(), Some("DL01AB1234"));
        assert!(registry.resolve_device("dev-2").is_none());

        registry.set_active("DL01AB1234", false);
        assert_eq!(registry.is_active("DL01AB1234"), Some(false));
    }

    #[test]
    fn test_actor_rights() {
        let vehicle = VehicleInfo {
            vehicle_id: "V1".into(),
            owner: Some("alice".into()),
            class: VehicleClass::Private,
            active: true,
        };
        assert!(Actor::new("alice", Role::PrivateOwner).owns(&vehicle));
        assert!(!Actor::new("bob", Role::PrivateOwner).owns(&vehicle));
        assert!(Actor::new("officer", Role::Police).is_reviewer());
        assert!(!Actor::new("bob", Role::NormalUser).is_reviewer());
    }

    #[test]
    fn test_device_health_window() {
        let registry = InMemoryRegistry::new();
        registry.add_vehicle("BUS-7", None, VehicleClass::Public);
        registry.attach_device("fresh", "BUS-7");
        registry.attach_device("stale", "BUS-7");
        registry.attach_device("silent", "BUS-7");

        let now = Utc::now();
        registry.touch_device("fresh", now - Duration::minutes(2));
        registry.touch_device("stale", now - Duration::minutes(30));

        let health = registry.device_health(now);
        let by_id = |id: &str| health.iter().find(|h| h.device_id == id).unwrap().healthy;
        assert!(by_id("fresh"));
        assert!(!by_id("stale"));
        assert!(!by_id("silent"));
    }
}
