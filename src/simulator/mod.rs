// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Fleet simulator for demo/testing
//!
//! Private cars wander around a centre point, buses shuttle between fixed
//! stops and report a trip each time they arrive. Either may be pushed into a
//! crash or theft scenario, at random or on request.

use chrono::{DateTime, Duration, Utc};
use rand::prelude::*;
use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::config::SimulatorConfig;
use crate::registry::{InMemoryRegistry, VehicleClass};
use crate::routes::{TripCompletion, Waypoint};
use crate::spatial::GeoPoint;
use crate::telemetry::SampleInput;

const METERS_PER_DEG: f64 = 111_320.0;
const GRAVITY: f64 = 9.8;
/// Every n-th simulated vehicle is a bus
const BUS_EVERY: usize = 5;
/// A bus within this distance of its target stop has arrived
const ARRIVAL_M: f64 = 30.0;
const THEFT_TICKS: u32 = 8;
const CRASH_STILL_TICKS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Scenario {
    Driving,
    /// Impact sample is emitted on the next tick, then the car stays still
    Crash { remaining: u32 },
    /// Parked with the engine off while being moved away
    Theft { remaining: u32 },
}

#[derive(Debug, Clone)]
struct BusLine {
    stops: [Waypoint; 2],
    /// Index of the stop being driven to
    target: usize,
    departed_at: Option<DateTime<Utc>>,
    travelled_m: f64,
}

#[derive(Debug, Clone)]
struct SimVehicle {
    device_id: String,
    vehicle_id: String,
    owner: Option<String>,
    class: VehicleClass,
    position: GeoPoint,
    heading_deg: f64,
    speed: f64,
    scenario: Scenario,
    line: Option<BusLine>,
}

/// One fleet tick: a sample per vehicle plus any bus arrivals
#[derive(Debug, Clone, Default)]
pub struct SimTick {
    pub samples: Vec<SampleInput>,
    pub trips: Vec<TripCompletion>,
}

/// Simulates a fleet of vehicles reporting telemetry
pub struct FleetSimulator {
    config: SimulatorConfig,
    vehicles: Vec<SimVehicle>,
    rng: StdRng,
}

impl FleetSimulator {
    pub fn new(config: SimulatorConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic fleet for tests
    pub fn with_seed(config: SimulatorConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: SimulatorConfig, mut rng: StdRng) -> Self {
        let center = GeoPoint::new(config.center_lat, config.center_lon);
        let spread = config.spread_deg.max(0.001);
        let lines = bus_lines(center, spread);

        let vehicles = (0..config.vehicles)
            .map(|i| {
                let n = i + 1;
                let is_bus = n % BUS_EVERY == 0;
                let position = GeoPoint::new(
                    center.lat + rng.gen_range(-spread..spread),
                    center.lon + rng.gen_range(-spread..spread),
                );

                if is_bus {
                    let line = lines[(n / BUS_EVERY) % lines.len()].clone();
                    SimVehicle {
                        device_id: format!("sim-dev-{:03}", n),
                        vehicle_id: format!("SIM-BUS-{:03}", n),
                        owner: None,
                        class: VehicleClass::Public,
                        position: line.stops[0].point,
                        heading_deg: 0.0,
                        speed: rng.gen_range(8.0..14.0),
                        scenario: Scenario::Driving,
                        line: Some(line),
                    }
                } else {
                    SimVehicle {
                        device_id: format!("sim-dev-{:03}", n),
                        vehicle_id: format!("SIM-CAR-{:03}", n),
                        owner: Some(format!("owner-{:03}", n)),
                        class: VehicleClass::Private,
                        position,
                        heading_deg: rng.gen_range(0.0..360.0),
                        speed: rng.gen_range(6.0..20.0),
                        scenario: Scenario::Driving,
                        line: None,
                    }
                }
            })
            .collect::<Vec<_>>();

        info!("Fleet simulator created with {} vehicles", vehicles.len());
        Self { config, vehicles, rng }
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.config.tick_ms.max(1))
    }

    /// Register every simulated vehicle and its device
    pub fn register(&self, registry: &InMemoryRegistry) {
        for v in &self.vehicles {
            registry.add_vehicle(&v.vehicle_id, v.owner.as_deref(), v.class);
            registry.attach_device(&v.device_id, &v.vehicle_id);
        }
    }

    pub fn device_ids(&self) -> Vec<String> {
        self.vehicles.iter().map(|v| v.device_id.clone()).collect()
    }

    /// Force a crash on the next tick. Only a moving vehicle can crash.
    pub fn inject_crash(&mut self, index: usize) -> bool {
        match self.vehicles.get_mut(index) {
            Some(v) if v.scenario == Scenario::Driving && v.speed > 0.0 => {
                v.scenario = Scenario::Crash {
                    remaining: CRASH_STILL_TICKS,
                };
                true
            }
            _ => false,
        }
    }

    /// Start a theft sequence on the next tick
    pub fn inject_theft(&mut self, index: usize) -> bool {
        match self.vehicles.get_mut(index) {
            Some(v) if v.scenario == Scenario::Driving => {
                v.scenario = Scenario::Theft {
                    remaining: THEFT_TICKS,
                };
                true
            }
            _ => false,
        }
    }

    /// Advance every vehicle by `dt` and report what happened at `now`
    pub fn tick(&mut self, now: DateTime<Utc>, dt: Duration) -> SimTick {
        let dt_secs = dt.num_milliseconds().max(0) as f64 / 1000.0;
        let mut tick = SimTick::default();

        for i in 0..self.vehicles.len() {
            if self.vehicles[i].scenario == Scenario::Driving {
                self.maybe_start_incident(i);
            }

            let rng = &mut self.rng;
            let v = &mut self.vehicles[i];
            let sample = match v.scenario {
                Scenario::Driving => {
                    let trip = drive(v, rng, dt_secs, now);
                    tick.trips.extend(trip);
                    cruise_sample(v, rng, now)
                }
                Scenario::Crash { remaining } => {
                    let sample = if remaining == CRASH_STILL_TICKS {
                        debug!(vehicle = %v.vehicle_id, "Simulating impact");
                        impact_sample(v, rng, now)
                    } else {
                        still_sample(v, now, true)
                    };
                    v.speed = 0.0;
                    v.scenario = match remaining {
                        0 | 1 => {
                            v.speed = rng.gen_range(6.0..12.0);
                            Scenario::Driving
                        }
                        r => Scenario::Crash { remaining: r - 1 },
                    };
                    sample
                }
                Scenario::Theft { remaining } => {
                    v.speed = rng.gen_range(2.0..4.0);
                    advance(v, dt_secs);
                    let sample = theft_sample(v, now);
                    v.scenario = match remaining {
                        0 | 1 => Scenario::Driving,
                        r => Scenario::Theft { remaining: r - 1 },
                    };
                    sample
                }
            };
            tick.samples.push(sample);
        }

        tick
    }

    fn maybe_start_incident(&mut self, index: usize) {
        let roll: f64 = self.rng.gen();
        if roll < self.config.crash_probability {
            self.inject_crash(index);
        } else if roll < self.config.crash_probability + self.config.theft_probability {
            self.inject_theft(index);
        }
    }
}

/// Two shuttle lines crossing the centre
fn bus_lines(center: GeoPoint, spread: f64) -> Vec<BusLine> {
    let line = |a: (&str, f64, f64), b: (&str, f64, f64)| BusLine {
        stops: [
            Waypoint::new(a.0, GeoPoint::new(center.lat + a.1 * spread, center.lon + a.2 * spread)),
            Waypoint::new(b.0, GeoPoint::new(center.lat + b.1 * spread, center.lon + b.2 * spread)),
        ],
        target: 1,
        departed_at: None,
        travelled_m: 0.0,
    };
    vec![
        line(("North Depot", 0.8, 0.0), ("South Terminal", -0.8, 0.0)),
        line(("West Market", 0.0, -0.8), ("East Station", 0.0, 0.8)),
    ]
}

fn advance(v: &mut SimVehicle, dt_secs: f64) -> f64 {
    let meters = v.speed * dt_secs;
    let rad = v.heading_deg.to_radians();
    let lat = v.position.lat + meters * rad.cos() / METERS_PER_DEG;
    let lon = v.position.lon + meters * rad.sin() / (METERS_PER_DEG * lat.to_radians().cos().max(0.01));
    v.position = GeoPoint::new(lat.clamp(-89.9, 89.9), wrap_lon(lon));
    meters
}

fn wrap_lon(lon: f64) -> f64 {
    if lon > 180.0 {
        lon - 360.0
    } else if lon < -180.0 {
        lon + 360.0
    } else {
        lon
    }
}

fn bearing_deg(from: &GeoPoint, to: &GeoPoint) -> f64 {
    let dy = to.lat - from.lat;
    let dx = (to.lon - from.lon) * from.lat.to_radians().cos();
    dx.atan2(dy).to_degrees().rem_euclid(360.0)
}

/// Move a driving vehicle; buses report a trip when they reach their stop
fn drive(v: &mut SimVehicle, rng: &mut StdRng, dt_secs: f64, now: DateTime<Utc>) -> Option<TripCompletion> {
    v.speed = (v.speed + rng.gen_range(-0.5..0.5)).clamp(4.0, 22.0);

    let Some(line) = v.line.as_mut() else {
        v.heading_deg = (v.heading_deg + rng.gen_range(-10.0..10.0)).rem_euclid(360.0);
        advance(v, dt_secs);
        return None;
    };

    let target = line.stops[line.target].point;
    let remaining = v.position.distance_to(&target);
    let departed_at = *line.departed_at.get_or_insert(now);

    if remaining <= ARRIVAL_M {
        let from = line.stops[1 - line.target].clone();
        let to = line.stops[line.target].clone();
        let duration = (now - departed_at).num_milliseconds() as f64 / 1000.0;
        let trip = TripCompletion::new(&v.vehicle_id, from, to).with_stats(
            Some(line.travelled_m),
            Some(duration.max(0.0)),
            None,
        );

        line.target = 1 - line.target;
        line.departed_at = Some(now);
        line.travelled_m = 0.0;
        v.position = target;
        return Some(trip);
    }

    v.heading_deg = bearing_deg(&v.position, &target);
    let step = (v.speed * dt_secs).min(remaining);
    let saved = v.speed;
    if dt_secs > 0.0 {
        v.speed = step / dt_secs;
    }
    let moved = advance(v, dt_secs);
    v.speed = saved;
    if let Some(line) = v.line.as_mut() {
        line.travelled_m += moved;
    }
    None
}

fn base_sample(v: &SimVehicle, now: DateTime<Utc>) -> SampleInput {
    let mut input = SampleInput::new(&v.device_id, now, v.position.lat, v.position.lon);
    input.heading = Some(v.heading_deg);
    input.speed = Some(v.speed);
    input.altitude = Some(215.0);
    input
}

fn cruise_sample(v: &SimVehicle, rng: &mut StdRng, now: DateTime<Utc>) -> SampleInput {
    let mut input = base_sample(v, now);
    input.engine_on = true;
    input.pitch = Some(rng.gen_range(-3.0..3.0));
    input.roll = Some(rng.gen_range(-3.0..3.0));
    input.accel_x = Some(rng.gen_range(-1.0..1.0));
    input.accel_y = Some(rng.gen_range(-1.0..1.0));
    input.accel_z = Some(GRAVITY + rng.gen_range(-0.3..0.3));
    input
}

/// Sample carrying every crash cue: sharp stop, tilt, lateral and vertical spike
fn impact_sample(v: &SimVehicle, rng: &mut StdRng, now: DateTime<Utc>) -> SampleInput {
    let mut input = base_sample(v, now);
    input.engine_on = true;
    input.speed = Some(v.speed * rng.gen_range(0.0..0.3));
    input.pitch = Some(rng.gen_range(50.0..80.0));
    input.roll = Some(rng.gen_range(-40.0..40.0));
    input.accel_x = Some(rng.gen_range(15.0..40.0));
    input.accel_y = Some(rng.gen_range(-20.0..20.0));
    input.accel_z = Some(rng.gen_range(40.0..60.0));
    input
}

fn still_sample(v: &SimVehicle, now: DateTime<Utc>, engine_on: bool) -> SampleInput {
    let mut input = base_sample(v, now);
    input.speed = Some(0.0);
    input.engine_on = engine_on;
    input.accel_z = Some(GRAVITY);
    input
}

fn theft_sample(v: &SimVehicle, now: DateTime<Utc>) -> SampleInput {
    let mut input = base_sample(v, now);
    input.engine_on = false;
    input.parked = true;
    input.owner_nearby = false;
    input
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CrashConfig;
    use crate::detection::CrashDetector;
    use crate::registry::VehicleRegistry;
    use crate::telemetry::TelemetrySample;
    use chrono::TimeZone;

    fn config(vehicles: usize) -> SimulatorConfig {
        SimulatorConfig {
            vehicles,
            crash_probability: 0.0,
            theft_probability: 0.0,
            ..SimulatorConfig::default()
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 7, 0, 0).unwrap()
    }

    #[test]
    fn test_fleet_emits_valid_samples() {
        let mut sim = FleetSimulator::with_seed(config(10), 7);
        assert_eq!(sim.len(), 10);

        for step in 0..30 {
            let tick = sim.tick(t0() + Duration::seconds(step), Duration::seconds(1));
            assert_eq!(tick.samples.len(), 10);
            for sample in &tick.samples {
                assert!(sample.validate().is_ok(), "invalid sample {:?}", sample);
            }
        }
    }

    #[test]
    fn test_register_attaches_devices() {
        let sim = FleetSimulator::with_seed(config(6), 1);
        let registry = InMemoryRegistry::new();
        sim.register(&registry);

        let bus = registry.resolve_device("sim-dev-005").unwrap();
        assert_eq!(bus, "SIM-BUS-005");
        assert!(registry.vehicle(&bus).unwrap().is_route_eligible());
        let car = registry.vehicle("SIM-CAR-001").unwrap();
        assert_eq!(car.owner.as_deref(), Some("owner-001"));
    }

    #[test]
    fn test_injected_crash_trips_detector() {
        let mut sim = FleetSimulator::with_seed(config(1), 42);
        let detector = CrashDetector::new(CrashConfig::default());

        let first = sim.tick(t0(), Duration::seconds(1)).samples.remove(0);
        assert!(sim.inject_crash(0));
        let at = t0() + Duration::milliseconds(1500);
        let second = sim.tick(at, Duration::milliseconds(1500)).samples.remove(0);

        let prior = TelemetrySample::record(first, "SIM-CAR-001", t0());
        let current = TelemetrySample::record(second, "SIM-CAR-001", at);
        assert!(detector.evaluate(&prior, &current).is_some());
        assert!(!sim.inject_crash(0));
    }

    #[test]
    fn test_injected_theft_is_parked_and_moving() {
        let mut sim = FleetSimulator::with_seed(config(1), 3);
        assert!(sim.inject_theft(0));

        for step in 0..THEFT_TICKS as i64 {
            let sample = sim.tick(t0() + Duration::seconds(step), Duration::seconds(1)).samples.remove(0);
            assert!(sample.parked && !sample.engine_on && !sample.owner_nearby);
            assert!(sample.speed.unwrap() > 1.39);
        }
        let after = sim.tick(t0() + Duration::seconds(10), Duration::seconds(1)).samples.remove(0);
        assert!(!after.parked);
    }

    #[test]
    fn test_bus_reports_trip_on_arrival() {
        let cfg = SimulatorConfig {
            spread_deg: 0.001,
            ..config(5)
        };
        let mut sim = FleetSimulator::with_seed(cfg, 9);

        let mut trips = Vec::new();
        for step in 0..120 {
            trips.extend(sim.tick(t0() + Duration::seconds(step), Duration::seconds(1)).trips);
        }
        assert!(!trips.is_empty());
        let trip = &trips[0];
        assert_eq!(trip.vehicle_id, "SIM-BUS-005");
        assert!(trip.validate().is_ok());
        assert!(trip.distance_m.unwrap() > 0.0);
    }
}
