//! ==============================================================================
//! store.rs - sqlite persistence for readings and commands
//! ==============================================================================
//!
//! purpose:
//!     two append-mostly tables. every write here is a single statement, so
//!     each is its own atomic transaction - no multi-row transactions needed.
//!
//! layout:
//!     sensor_reading (id, current, voltage, motion_detected, timestamp)
//!     device_command (id, command, value, timestamp, executed)
//!
//!     created with IF NOT EXISTS on startup; there are no migrations.
//!
//! ==============================================================================

use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::domain::{DeviceCommand, NewReading, SensorReading};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS sensor_reading (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        current REAL NOT NULL DEFAULT 0.0,
        voltage REAL NOT NULL DEFAULT 0.0,
        motion_detected BOOLEAN NOT NULL DEFAULT 0,
        timestamp TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS device_command (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        command VARCHAR(50) NOT NULL,
        value BOOLEAN NOT NULL,
        timestamp TEXT NOT NULL,
        executed BOOLEAN NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS idx_device_command_pending
        ON device_command (executed, id)",
];

/// clone-able handle to the connection pool
#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// open (creating if missing) the database at `url` and ensure the schema
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid database url: {}", url))?
            .create_if_missing(true);

        // every connection to an in-memory database is a separate database,
        // so those get exactly one connection that is never recycled
        let pool_options = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open database: {}", url))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        for stmt in SCHEMA {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .context("failed to create schema")?;
        }
        Ok(())
    }

    pub async fn insert_reading(&self, reading: &NewReading) -> Result<SensorReading, sqlx::Error> {
        sqlx::query_as::<_, SensorReading>(
            "INSERT INTO sensor_reading (current, voltage, motion_detected, timestamp)
             VALUES (?, ?, ?, ?)
             RETURNING id, current, voltage, motion_detected, timestamp",
        )
        .bind(reading.current)
        .bind(reading.voltage)
        .bind(reading.motion_detected)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
    }

    /// most recent readings, newest first
    pub async fn recent_readings(&self, limit: u32) -> Result<Vec<SensorReading>, sqlx::Error> {
        sqlx::query_as::<_, SensorReading>(
            "SELECT id, current, voltage, motion_detected, timestamp
             FROM sensor_reading ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn insert_command(&self, command: &str, value: bool) -> Result<DeviceCommand, sqlx::Error> {
        sqlx::query_as::<_, DeviceCommand>(
            "INSERT INTO device_command (command, value, timestamp, executed)
             VALUES (?, ?, ?, 0)
             RETURNING id, command, value, timestamp, executed",
        )
        .bind(command)
        .bind(value)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
    }

    /// flip every pending command to executed and hand back exactly those rows
    ///
    /// selection and marking are one statement, so two concurrent callers
    /// can never both receive the same command.
    pub async fn take_pending_commands(&self) -> Result<Vec<DeviceCommand>, sqlx::Error> {
        let mut taken = sqlx::query_as::<_, DeviceCommand>(
            "UPDATE device_command SET executed = 1
             WHERE executed = 0
             RETURNING id, command, value, timestamp, executed",
        )
        .fetch_all(&self.pool)
        .await?;
        // RETURNING order is unspecified
        taken.sort_by_key(|c| c.id);
        Ok(taken)
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
pub(crate) async fn memory_store() -> Store {
    Store::connect("sqlite::memory:").await.unwrap()
}
