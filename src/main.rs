// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! RoadSense - Real-time Vehicle Telemetry Core
//!
//! Runs the telemetry engine headless, fed either by the built-in fleet
//! simulator (`--demo`) or by a JSON-lines replay file (`--replay`).

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use roadsense::registry::VehicleClass;
use roadsense::{
    Config, CoreError, Database, Engine, FleetSimulator, InMemoryRegistry, SampleInput, Snapshot, TripCompletion,
    VERSION,
};

/// RoadSense - Real-time Vehicle Telemetry Core
#[derive(Parser, Debug)]
#[command(name = "roadsense")]
#[command(author = "RoadSense Project")]
#[command(version = VERSION)]
#[command(about = "Crash and theft detection, congestion and route discovery for vehicle fleets")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Demo mode with a simulated fleet
    #[arg(long)]
    demo: bool,

    /// Replay a JSON-lines file of vehicles, samples and trips
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Data output directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Keep everything in memory; nothing is written to disk
    #[arg(long)]
    in_memory: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,
}

/// One line of a replay file
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ReplayRecord {
    Vehicle {
        vehicle_id: String,
        #[serde(default)]
        owner: Option<String>,
        class: VehicleClass,
        #[serde(default)]
        devices: Vec<String>,
    },
    Sample(SampleInput),
    Trip(TripCompletion),
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load or create configuration
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    // Initialize logging
    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        Level::from_str(&config.log_level).unwrap_or(Level::INFO)
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("🚗 RoadSense v{} - Real-time Vehicle Telemetry Core", VERSION);

    // Override with command line args
    if args.demo {
        config.demo_mode = true;
    }
    if let Some(data_dir) = args.data_dir {
        config.database.path = data_dir.join("roadsense.db");
        config.data_dir = data_dir;
    }
    config.validate()?;

    info!("Configuration loaded from {:?}", config_path);
    info!("Demo mode: {}", config.demo_mode);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config, args.replay, args.in_memory))
}

async fn run(config: Config, replay: Option<PathBuf>, in_memory: bool) -> Result<()> {
    // Initialize database
    let db = if in_memory || !config.database.enabled {
        Arc::new(Database::open_in_memory()?)
    } else {
        Arc::new(Database::open(&config.database)?)
    };

    let snapshot = Snapshot {
        routes: db.load_routes()?,
        crashes: db.load_crashes()?,
        thefts: db.load_thefts()?,
    };

    let registry = Arc::new(InMemoryRegistry::new());
    let simulator = if config.demo_mode {
        let sim = FleetSimulator::new(config.simulator.clone());
        sim.register(&registry);
        Some(sim)
    } else {
        None
    };

    let engine = Arc::new(Engine::restore(config.clone(), registry.clone(), db.clone(), snapshot)?);
    engine.start();
    info!("Core engine initialized");

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Periodic tasks
    let scheduler = Arc::new(engine.scheduler().await);
    {
        let db = db.clone();
        let retention_days = config.database.retention_days;
        scheduler
            .add_task(
                "db-cleanup",
                std::time::Duration::from_secs(config.database.cleanup_interval_secs),
                move || {
                    if let Err(e) = db.cleanup(retention_days, Utc::now()) {
                        error!("Database cleanup failed: {}", e);
                    }
                },
            )
            .await;
    }
    let scheduler_handle = {
        let scheduler = scheduler.clone();
        let rx = shutdown_tx.subscribe();
        tokio::spawn(async move { scheduler.run(rx).await })
    };

    // Notification intents are handed to dispatch; here they are only logged
    let notify_handle = {
        let mut intents = engine.bus().subscribe_notifications();
        let mut shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    intent = intents.recv() => match intent {
                        Ok(intent) => warn!(
                            channel = ?intent.channel,
                            vehicle = %intent.vehicle_id,
                            "Notification intent for {:?} at {:.5},{:.5}",
                            intent.subject,
                            intent.location.lat,
                            intent.location.lon
                        ),
                        Err(broadcast::error::RecvError::Lagged(n)) => warn!("Dropped {} notification intents", n),
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = shutdown.recv() => break,
                }
            }
        })
    };

    if let Some(path) = replay {
        replay_file(&engine, &registry, &path)?;
    }

    let feed_handle = simulator.map(|sim| {
        let engine = engine.clone();
        let shutdown = shutdown_tx.subscribe();
        tokio::spawn(run_simulator(engine, sim, shutdown))
    });

    info!("🚀 RoadSense running");
    info!("   Press Ctrl+C to shutdown");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received, cleaning up...");
    let _ = shutdown_tx.send(());

    if let Some(handle) = feed_handle {
        let _ = handle.await;
    }
    let _ = scheduler_handle.await;
    let _ = notify_handle.await;
    engine.stop();

    let state = engine.state();
    info!(
        "Ingested {} samples, {} crashes, {} thefts, {} escalations, {} routes ({} public)",
        state.samples_ingested,
        state.crashes_detected,
        state.thefts_detected,
        state.escalations,
        state.routes_known,
        state.public_routes
    );
    match db.get_stats() {
        Ok(stats) => info!("Database: {:?}", stats),
        Err(e) => warn!("Could not read database stats: {}", e),
    }

    info!("RoadSense shutdown complete");
    Ok(())
}

/// Drive the engine from the fleet simulator until shutdown
async fn run_simulator(engine: Arc<Engine>, mut sim: FleetSimulator, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(sim.tick_interval());
    let mut last = Utc::now();
    info!("Simulated fleet of {} vehicles started", sim.len());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Utc::now();
                let tick = sim.tick(now, now - last);
                last = now;

                for input in tick.samples {
                    if let Err(e) = engine.ingest_at(input, now) {
                        debug!("Simulated sample rejected: {}", e);
                    }
                }
                for trip in tick.trips {
                    match engine.complete_trip_at(&trip, now) {
                        Ok(Some(m)) => debug!(route = %m.route.route_id, trips = m.route.trip_count, "Simulated trip recorded"),
                        Ok(None) => {}
                        Err(e) => warn!("Simulated trip rejected: {}", e),
                    }
                }
            }
            _ = shutdown.recv() => {
                info!("Fleet simulator stopping...");
                break;
            }
        }
    }
}

/// Feed a JSON-lines file through the engine. Bad lines are logged and skipped.
fn replay_file(engine: &Engine, registry: &InMemoryRegistry, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading replay file {:?}", path))?;
    let (mut samples, mut trips, mut skipped) = (0usize, 0usize, 0usize);

    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let record: ReplayRecord = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                warn!("Replay line {} unreadable: {}", line_no + 1, e);
                skipped += 1;
                continue;
            }
        };

        let result = match record {
            ReplayRecord::Vehicle {
                vehicle_id,
                owner,
                class,
                devices,
            } => {
                registry.add_vehicle(&vehicle_id, owner.as_deref(), class);
                for device in &devices {
                    registry.attach_device(device, &vehicle_id);
                }
                Ok(())
            }
            ReplayRecord::Sample(input) => engine.ingest_at(input, Utc::now()).map(|_| samples += 1),
            ReplayRecord::Trip(trip) => engine.complete_trip(&trip).map(|_| trips += 1),
        };

        if let Err(e) = result {
            match e {
                CoreError::Storage(_) => return Err(e).context("replay aborted"),
                e => {
                    warn!("Replay line {} rejected: {}", line_no + 1, e);
                    skipped += 1;
                }
            }
        }
    }

    info!(
        "Replayed {:?}: {} samples, {} trips, {} lines skipped",
        path, samples, trips, skipped
    );
    Ok(())
}
