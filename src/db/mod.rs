// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Database module for persistent storage

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::detection::{CrashEvent, TheftEvent};
use crate::error::StoreError;
use crate::routes::Route;
use crate::telemetry::TelemetrySample;

/// Durable store behind the core.
///
/// Every state change is written here before it becomes visible in memory; an
/// `Err` means nothing was committed and the caller may retry.
pub trait Persistence: Send + Sync {
    fn store_sample(&self, sample: &TelemetrySample) -> std::result::Result<(), StoreError>;

    /// Insert or replace by id
    fn store_crash(&self, event: &CrashEvent) -> std::result::Result<(), StoreError>;

    /// Insert or replace by id
    fn store_theft(&self, event: &TheftEvent) -> std::result::Result<(), StoreError>;

    /// Insert or replace by route id
    fn store_route(&self, route: &Route) -> std::result::Result<(), StoreError>;
}

fn stamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// SQLite-backed store
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&config.path)?;

        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        "#,
        )?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.create_tables()?;

        info!("Database opened at {:?}", config.path);
        Ok(db)
    }

    /// Throwaway database for tests and `--in-memory` runs
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
        };
        db.create_tables()?;
        debug!("In-memory database ready");
        Ok(db)
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            -- Telemetry samples
            CREATE TABLE IF NOT EXISTS samples (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                device_id TEXT NOT NULL,
                vehicle_id TEXT NOT NULL,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                speed REAL,
                data BLOB NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_samples_timestamp ON samples(timestamp);
            CREATE INDEX IF NOT EXISTS idx_samples_vehicle ON samples(vehicle_id);

            -- Crash events
            CREATE TABLE IF NOT EXISTS crash_events (
                id TEXT PRIMARY KEY,
                vehicle_id TEXT NOT NULL,
                status TEXT NOT NULL,
                severity TEXT NOT NULL,
                detected_at TEXT NOT NULL,
                confirmation_deadline TEXT NOT NULL,
                data BLOB NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_crash_vehicle ON crash_events(vehicle_id);
            CREATE INDEX IF NOT EXISTS idx_crash_status ON crash_events(status);

            -- Theft events
            CREATE TABLE IF NOT EXISTS theft_events (
                id TEXT PRIMARY KEY,
                vehicle_id TEXT NOT NULL,
                status TEXT NOT NULL,
                detected_at TEXT NOT NULL,
                data BLOB NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_theft_vehicle ON theft_events(vehicle_id);

            -- Discovered routes
            CREATE TABLE IF NOT EXISTS routes (
                route_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                is_public INTEGER NOT NULL,
                trip_count INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                data BLOB NOT NULL,
                updated_at TEXT NOT NULL
            );
        "#,
        )?;

        Ok(())
    }

    fn load_blobs<T: DeserializeOwned>(&self, sql: &str) -> Result<Vec<T>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| row.get::<_, Vec<u8>>(0))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(bincode::deserialize(&row?)?);
        }
        Ok(out)
    }

    /// All routes in creation order
    pub fn load_routes(&self) -> Result<Vec<Route>> {
        self.load_blobs("SELECT data FROM routes ORDER BY created_at, rowid")
    }

    pub fn load_crashes(&self) -> Result<Vec<CrashEvent>> {
        self.load_blobs("SELECT data FROM crash_events ORDER BY detected_at")
    }

    pub fn load_thefts(&self) -> Result<Vec<TheftEvent>> {
        self.load_blobs("SELECT data FROM theft_events ORDER BY detected_at")
    }

    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let conn = self.conn.lock();
        let count = |table: &str| -> Result<usize> {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
            Ok(n as usize)
        };

        let sample_count = count("samples")?;
        let crash_count = count("crash_events")?;
        let theft_count = count("theft_events")?;
        let route_count = count("routes")?;

        let size_bytes: i64 = conn
            .query_row(
                "SELECT page_count * page_size as size FROM pragma_page_count(), pragma_page_size()",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        Ok(DatabaseStats {
            sample_count,
            crash_count,
            theft_count,
            route_count,
            size_bytes: size_bytes as u64,
        })
    }

    /// Drop samples older than the retention period. Events and routes are kept.
    pub fn cleanup(&self, retention_days: u32, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock();

        let cutoff = now - chrono::Duration::days(retention_days as i64);
        let deleted = conn.execute("DELETE FROM samples WHERE timestamp < ?1", params![stamp(&cutoff)])?;

        conn.execute("VACUUM", [])?;

        info!("Cleaned up {} samples older than {} days", deleted, retention_days);
        Ok(deleted)
    }
}

impl Persistence for Database {
    fn store_sample(&self, sample: &TelemetrySample) -> std::result::Result<(), StoreError> {
        let data = bincode::serialize(sample)?;
        self.conn.lock().execute(
            "INSERT INTO samples (timestamp, device_id, vehicle_id, latitude, longitude, speed, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                stamp(&sample.timestamp),
                sample.device_id,
                sample.vehicle_id,
                sample.location.lat,
                sample.location.lon,
                sample.speed,
                data
            ],
        )?;
        Ok(())
    }

    fn store_crash(&self, event: &CrashEvent) -> std::result::Result<(), StoreError> {
        let data = bincode::serialize(event)?;
        self.conn.lock().execute(
            r#"INSERT OR REPLACE INTO crash_events
               (id, vehicle_id, status, severity, detected_at, confirmation_deadline, data, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                event.id.to_string(),
                event.vehicle_id,
                format!("{:?}", event.status),
                format!("{:?}", event.severity),
                stamp(&event.detected_at),
                stamp(&event.confirmation_deadline),
                data,
                stamp(&event.updated_at)
            ],
        )?;
        Ok(())
    }

    fn store_theft(&self, event: &TheftEvent) -> std::result::Result<(), StoreError> {
        let data = bincode::serialize(event)?;
        self.conn.lock().execute(
            r#"INSERT OR REPLACE INTO theft_events
               (id, vehicle_id, status, detected_at, data, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                event.id.to_string(),
                event.vehicle_id,
                format!("{:?}", event.status),
                stamp(&event.detected_at),
                data,
                stamp(&event.updated_at)
            ],
        )?;
        Ok(())
    }

    fn store_route(&self, route: &Route) -> std::result::Result<(), StoreError> {
        let data = bincode::serialize(route)?;
        self.conn.lock().execute(
            r#"INSERT OR REPLACE INTO routes
               (route_id, name, is_public, trip_count, created_at, data, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                route.route_id,
                route.name,
                route.is_public,
                route.trip_count,
                stamp(&route.created_at),
                data,
                stamp(&route.updated_at)
            ],
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct DatabaseStats {
    pub sample_count: usize,
    pub crash_count: usize,
    pub theft_count: usize,
    pub route_count: usize,
    pub size_bytes: u64,
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Store that can be switched to fail every write
    #[derive(Default)]
    pub(crate) struct FlakyStore {
        pub failing: AtomicBool,
    }

    impl FlakyStore {
        fn check(&self) -> std::result::Result<(), StoreError> {
            if self.failing.load(Ordering::SeqCst) {
                Err(StoreError::Backend("disk unavailable".into()))
            } else {
                Ok(())
            }
        }
    }

    impl Persistence for FlakyStore {
        fn store_sample(&self, _: &TelemetrySample) -> std::result::Result<(), StoreError> {
            self.check()
        }

        fn store_crash(&self, _: &CrashEvent) -> std::result::Result<(), StoreError> {
            self.check()
        }

        fn store_theft(&self, _: &TheftEvent) -> std::result::Result<(), StoreError> {
            self.check()
        }

        fn store_route(&self, _: &Route) -> std::result::Result<(), StoreError> {
            self.check()
        }
    }
}
