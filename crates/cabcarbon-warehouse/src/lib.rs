//! # cabcarbon warehouse
//!
//! DuckDB-backed storage and processing for the taxi emissions pipeline.
//!
//! ## Overview
//!
//! A [`Warehouse`] owns one DuckDB connection for a whole run. Every stage
//! is a method on it, so the connection is passed explicitly and closes when
//! the warehouse is dropped.
//!
//! | Stage | Module |
//! |-------|--------|
//! | Monthly parquet loading, emissions factors | [`loader`] |
//! | Timestamp column normalization | [`normalize`] |
//! | Deduplication and rule-based cleaning | [`cleaner`] |
//! | CO₂ estimation and calendar buckets | [`estimator`] |
//! | Grouped totals, largest trips, monthly series | [`aggregate`] |
//! | Descriptive table statistics | [`summary`] |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cabcarbon_core::{CleaningRules, Fleet};
//! use cabcarbon_warehouse::{Warehouse, WarehouseConfig};
//!
//! let warehouse = Warehouse::open(WarehouseConfig::default())?;
//! let report = warehouse.clean_fleet(Fleet::Yellow, &CleaningRules::default())?;
//! println!("removed {} rows", report.stats.removed_count);
//! # Ok::<(), cabcarbon_warehouse::WarehouseError>(())
//! ```
//!
//! ## Security
//!
//! Values (thresholds, fleet names, vehicle classes) are always bound as
//! query parameters. Identifiers come from a closed set of table and column
//! names and are quoted before use.
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `yellow_tripdata`, `green_tripdata` | Raw, then cleaned, trips per fleet |
//! | `vehicle_emissions` | Emissions factors per vehicle class |
//! | `all_data_transformed` | Clean trips of all fleets with CO₂ and calendar buckets |
//! | `ingest_log` | One row per attempted monthly load |
//! | `clean_log` | One row per completed fleet clean |
//! | `fleet_state` | Whether a fleet's table holds cleaned trips since its last load |

pub mod aggregate;
pub mod cleaner;
pub mod duckdb;
pub mod estimator;
pub mod loader;
pub mod migrations;
pub mod normalize;
pub mod summary;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::types::Value as DuckValue;
use ::duckdb::{params_from_iter, Connection, ToSql};
use cabcarbon_core::{parse_timestamp, Fleet, SqlFragment, SqlParam, TripRecord, ValidationError};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

pub use aggregate::LargestTrip;
pub use cleaner::{CleanReport, RuleOutcome};
pub use duckdb::{AccessMode, Session};
pub use estimator::{FleetRows, TransformReport, EMISSIONS_TABLE, TRANSFORMED_TABLE};
pub use loader::{
    period_sources, IngestEntry, LoadReport, PeriodSource, SkippedPeriod, DEFAULT_BASE_URL,
};
pub use normalize::{ColumnOutcome, NormalizeReport};
pub use summary::TableSummary;

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Invalid fleet, period or threshold.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The table a stage needs is missing or holds no rows.
    #[error("no data in table '{table}'")]
    NoData { table: String },

    /// A required column is absent under every accepted name.
    #[error("table '{table}' has no column '{column}'")]
    MissingColumn { table: String, column: String },

    /// Rows still break a rule after the cleaner deleted them.
    #[error("{remaining} rows in '{table}' still violate rule '{rule}'")]
    CleanVerification {
        table: String,
        rule: &'static str,
        remaining: u64,
    },

    /// Input was rejected before reaching the engine.
    #[error("query rejected: {0}")]
    QueryRejected(String),
}

/// Configuration for the warehouse database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for cabcarbon data.
    pub home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self::with_home(resolve_cabcarbon_home())
    }
}

impl WarehouseConfig {
    /// Configuration rooted at `home`, with the database file inside it.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let db_path = home.join("emissions.duckdb");
        Self { home, db_path }
    }
}

/// Existence and size of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "rows", rename_all = "snake_case")]
pub enum TableStatus {
    Missing,
    Empty,
    Populated(u64),
}

impl TableStatus {
    pub const fn row_count(self) -> u64 {
        match self {
            Self::Populated(rows) => rows,
            Self::Missing | Self::Empty => 0,
        }
    }

    pub const fn is_populated(self) -> bool {
        matches!(self, Self::Populated(_))
    }
}

/// The taxi emissions warehouse.
pub struct Warehouse {
    config: WarehouseConfig,
    session: Session,
    run_id: String,
}

impl Warehouse {
    /// Open a warehouse with default configuration.
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    /// Open the warehouse for writing, creating the database file and audit
    /// tables when needed.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let session = Session::open(config.db_path.clone(), AccessMode::ReadWrite)?;
        migrations::apply_migrations(&session)?;
        Ok(Self {
            config,
            session,
            run_id: String::from("local"),
        })
    }

    /// Open an existing database file for reporting only.
    pub fn open_read_only(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        let session = Session::open(config.db_path.clone(), AccessMode::ReadOnly)?;
        Ok(Self {
            config,
            session,
            run_id: String::from("local"),
        })
    }

    /// Tag audit rows written by this warehouse with `run_id`.
    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn config(&self) -> &WarehouseConfig {
        &self.config
    }

    /// Get the path to the database file.
    pub fn db_path(&self) -> &Path {
        self.session.db_path()
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.session
    }

    /// Whether `table` exists and how many rows it holds.
    pub fn table_status(&self, table: &str) -> Result<TableStatus, WarehouseError> {
        let exists: i64 = self.connection().query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ?",
            [table],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Ok(TableStatus::Missing);
        }

        match self.row_count(table)? {
            0 => Ok(TableStatus::Empty),
            rows => Ok(TableStatus::Populated(rows)),
        }
    }

    /// Row count of an existing table.
    pub fn row_count(&self, table: &str) -> Result<u64, WarehouseError> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table));
        let count: i64 = self.connection().query_row(sql.as_str(), [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    pub fn drop_table(&self, table: &str) -> Result<(), WarehouseError> {
        let sql = format!("DROP TABLE IF EXISTS {}", quote_identifier(table));
        self.connection().execute_batch(sql.as_str())?;
        Ok(())
    }

    /// Column names of `table`, in declaration order.
    pub fn column_names(&self, table: &str) -> Result<Vec<String>, WarehouseError> {
        let mut statement = self.connection().prepare(
            "SELECT column_name FROM information_schema.columns \
             WHERE table_name = ? ORDER BY ordinal_position",
        )?;
        let names = statement
            .query_map([table], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Number of rows in `table` matching `condition`.
    pub fn count_matching(
        &self,
        table: &str,
        condition: &SqlFragment,
    ) -> Result<u64, WarehouseError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            quote_identifier(table),
            condition.sql
        );
        let values = to_duck_values(&condition.params);
        let count: i64 = self.connection().query_row(
            sql.as_str(),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    /// Delete the rows of `table` matching `condition`; returns the number removed.
    pub fn delete_matching(
        &self,
        table: &str,
        condition: &SqlFragment,
    ) -> Result<u64, WarehouseError> {
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            quote_identifier(table),
            condition.sql
        );
        let values = to_duck_values(&condition.params);
        let removed = self
            .connection()
            .execute(sql.as_str(), params_from_iter(values.iter()))?;
        Ok(removed as u64)
    }

    /// Append trips to a fleet's raw table, creating it in the fleet's
    /// published shape if it does not exist yet.
    pub fn ingest_trips(&self, fleet: Fleet, rows: &[TripRecord]) -> Result<u64, WarehouseError> {
        let table = quote_identifier(fleet.table_name());
        self.connection().execute_batch(
            format!(
                "CREATE TABLE IF NOT EXISTS {table} (\
                 vendor_id BIGINT, \
                 {pickup} TIMESTAMP, \
                 {dropoff} TIMESTAMP, \
                 passenger_count BIGINT, \
                 trip_distance DOUBLE, \
                 total_amount DOUBLE)",
                pickup = fleet.source_pickup_column(),
                dropoff = fleet.source_dropoff_column(),
            )
            .as_str(),
        )?;

        if rows.is_empty() {
            return Ok(0);
        }

        let insert_sql = format!(
            "INSERT INTO {table} VALUES \
             (?, TRY_CAST(? AS TIMESTAMP), TRY_CAST(? AS TIMESTAMP), ?, ?, ?)"
        );
        self.in_transaction(|connection| {
            set_fleet_cleaned(connection, fleet, false, &self.run_id)?;
            let mut statement = connection.prepare(insert_sql.as_str())?;
            for row in rows {
                let pickup = row.pickup_datetime.map(cabcarbon_core::format_timestamp);
                let dropoff = row.dropoff_datetime.map(cabcarbon_core::format_timestamp);
                let params: [&dyn ToSql; 6] = [
                    &row.vendor_id,
                    &pickup,
                    &dropoff,
                    &row.passenger_count,
                    &row.trip_distance,
                    &row.total_amount,
                ];
                statement.execute(params.as_slice())?;
            }
            Ok(())
        })?;

        debug!(fleet = %fleet, rows = rows.len(), "ingested trips");
        Ok(rows.len() as u64)
    }

    /// Whether the fleet's table has been cleaned since it was last loaded.
    pub fn is_cleaned(&self, fleet: Fleet) -> Result<bool, WarehouseError> {
        let cleaned: i64 = self.connection().query_row(
            "SELECT COUNT(*) FROM fleet_state WHERE fleet = ? AND cleaned",
            [fleet.as_str()],
            |row| row.get(0),
        )?;
        Ok(cleaned > 0)
    }

    /// Read back trips from a normalized fleet table, ordered by time.
    pub fn fetch_trips(&self, fleet: Fleet, limit: usize) -> Result<Vec<TripRecord>, WarehouseError> {
        let sql = format!(
            "SELECT CAST(vendor_id AS BIGINT), \
             strftime(pickup_datetime, '%Y-%m-%d %H:%M:%S'), \
             strftime(dropoff_datetime, '%Y-%m-%d %H:%M:%S'), \
             CAST(passenger_count AS BIGINT), \
             CAST(trip_distance AS DOUBLE), \
             CAST(total_amount AS DOUBLE) \
             FROM {} \
             ORDER BY pickup_datetime NULLS LAST, dropoff_datetime NULLS LAST \
             LIMIT ?",
            quote_identifier(fleet.table_name())
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut statement = self.connection().prepare(sql.as_str())?;
        let raw = statement
            .query_map([limit], |row| {
                Ok(RawTrip {
                    vendor_id: row.get(0)?,
                    pickup: row.get(1)?,
                    dropoff: row.get(2)?,
                    passenger_count: row.get(3)?,
                    trip_distance: row.get(4)?,
                    total_amount: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter().map(RawTrip::into_record).collect()
    }

    /// Run `body` inside a transaction, committing on success and rolling
    /// back on failure.
    pub(crate) fn in_transaction<T>(
        &self,
        body: impl FnOnce(&Connection) -> Result<T, WarehouseError>,
    ) -> Result<T, WarehouseError> {
        let connection = self.connection();
        connection.execute_batch("BEGIN TRANSACTION")?;
        finalize_transaction(connection, body(connection))
    }
}

/// Trip columns as read from the engine, before timestamp parsing.
pub(crate) struct RawTrip {
    pub vendor_id: Option<i64>,
    pub pickup: Option<String>,
    pub dropoff: Option<String>,
    pub passenger_count: Option<i64>,
    pub trip_distance: Option<f64>,
    pub total_amount: Option<f64>,
}

impl RawTrip {
    pub(crate) fn into_record(self) -> Result<TripRecord, WarehouseError> {
        Ok(TripRecord {
            vendor_id: self.vendor_id,
            pickup_datetime: self.pickup.as_deref().map(parse_timestamp).transpose()?,
            dropoff_datetime: self.dropoff.as_deref().map(parse_timestamp).transpose()?,
            passenger_count: self.passenger_count,
            trip_distance: self.trip_distance,
            total_amount: self.total_amount,
        })
    }
}

/// Record whether `fleet`'s table holds cleaned trips. Runs inside the
/// caller's transaction.
pub(crate) fn set_fleet_cleaned(
    connection: &Connection,
    fleet: Fleet,
    cleaned: bool,
    run_id: &str,
) -> Result<(), WarehouseError> {
    connection.execute("DELETE FROM fleet_state WHERE fleet = ?", [fleet.as_str()])?;
    let params: [&dyn ToSql; 3] = [&fleet.as_str(), &cleaned, &run_id];
    connection.execute(
        "INSERT INTO fleet_state (fleet, cleaned, run_id, updated_at) \
         VALUES (?, ?, ?, CURRENT_TIMESTAMP)",
        params.as_slice(),
    )?;
    Ok(())
}

/// Finalize a transaction, committing on success or rolling back on failure.
fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback) = connection.execute_batch("ROLLBACK") {
                warn!(%rollback, "rollback failed");
            }
            Err(error)
        }
    }
}

pub(crate) fn to_duck_values(params: &[SqlParam]) -> Vec<DuckValue> {
    params
        .iter()
        .map(|param| match *param {
            SqlParam::Int(value) => DuckValue::BigInt(value),
            SqlParam::Float(value) => DuckValue::Double(value),
        })
        .collect()
}

/// Quote an identifier for inclusion in SQL text.
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Escape a string literal for table functions such as `read_parquet`.
///
/// Only used for file locations generated from configuration; values go
/// through parameters.
pub(crate) fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}

/// Resolve the cabcarbon home directory from environment or default.
fn resolve_cabcarbon_home() -> PathBuf {
    if let Some(path) = env::var_os("CABCARBON_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".cabcarbon");
    }

    PathBuf::from(".cabcarbon")
}

/// Fixtures shared by the unit tests and the behaviour tests crate.
#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;
    use tempfile::TempDir;

    pub fn open_temp() -> (TempDir, Warehouse) {
        let temp = tempfile::tempdir().expect("tempdir");
        let warehouse =
            Warehouse::open(WarehouseConfig::with_home(temp.path())).expect("warehouse open");
        (temp, warehouse)
    }

    pub fn trip(pickup: &str, dropoff: &str, passengers: i64, miles: f64, fare: f64) -> TripRecord {
        TripRecord::new(pickup, dropoff, passengers, miles, fare).expect("trip")
    }

    /// Write `rows` as a published-style monthly parquet file into `dir`.
    pub fn write_month(dir: &Path, fleet: Fleet, label: &str, rows: &[TripRecord]) -> PathBuf {
        let path = dir.join(format!("{}_{label}.parquet", fleet.table_name()));
        let connection = Connection::open_in_memory().expect("in-memory db");
        connection
            .execute_batch(
                format!(
                    "CREATE TABLE month (VendorID INTEGER, {} TIMESTAMP, {} TIMESTAMP, \
                     passenger_count DOUBLE, trip_distance DOUBLE, total_amount DOUBLE)",
                    fleet.source_pickup_column(),
                    fleet.source_dropoff_column()
                )
                .as_str(),
            )
            .expect("create month");

        for row in rows {
            let pickup = row.pickup_datetime.map(cabcarbon_core::format_timestamp);
            let dropoff = row.dropoff_datetime.map(cabcarbon_core::format_timestamp);
            let passengers = row.passenger_count.map(|count| count as f64);
            let params: [&dyn ToSql; 6] = [
                &row.vendor_id,
                &pickup,
                &dropoff,
                &passengers,
                &row.trip_distance,
                &row.total_amount,
            ];
            connection
                .execute(
                    "INSERT INTO month VALUES \
                     (?, TRY_CAST(? AS TIMESTAMP), TRY_CAST(? AS TIMESTAMP), ?, ?, ?)",
                    params.as_slice(),
                )
                .expect("insert month row");
        }

        connection
            .execute_batch(
                format!(
                    "COPY month TO '{}' (FORMAT PARQUET)",
                    escape_sql_string(&path.to_string_lossy())
                )
                .as_str(),
            )
            .expect("write parquet");
        path
    }
}
