//! Monthly trip file ingestion and the emissions reference table.

use std::io;
use std::path::Path;
use std::thread;
use std::time::Duration;

use ::duckdb::ToSql;
use cabcarbon_core::{Fleet, Period, ValidationError};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::estimator::EMISSIONS_TABLE;
use crate::{escape_sql_string, quote_identifier, set_fleet_cleaned, Warehouse, WarehouseError};

/// Public NYC TLC trip record bucket.
pub const DEFAULT_BASE_URL: &str = "https://d37ci6vzurychx.cloudfront.net/trip-data";

const EMISSIONS_COLUMNS: [&str; 2] = ["vehicle_type", "co2_grams_per_mile"];

/// Where one month of a fleet's trips is read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodSource {
    pub period: Period,
    /// URL or local file path understood by `read_parquet`.
    pub location: String,
}

/// Every monthly file of `fleet` for the years `start_year..=end_year`.
///
/// `base_url` may be a remote prefix or a local directory; a trailing slash
/// is ignored.
pub fn period_sources(
    base_url: &str,
    fleet: Fleet,
    start_year: i32,
    end_year: i32,
) -> Result<Vec<PeriodSource>, ValidationError> {
    let base = base_url.trim_end_matches('/');
    let sources = Period::range(start_year, end_year)?
        .into_iter()
        .map(|period| PeriodSource {
            period,
            location: format!("{base}/{}_{}.parquet", fleet.table_name(), period.label()),
        })
        .collect();
    Ok(sources)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedPeriod {
    pub period: Period,
    pub location: String,
    pub reason: String,
}

/// Outcome of loading one fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub fleet: Fleet,
    pub loaded: Vec<Period>,
    pub skipped: Vec<SkippedPeriod>,
    /// Rows in the fleet table after the last successful period.
    pub rows_total: u64,
}

/// One row of `ingest_log`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestEntry {
    pub fleet: String,
    pub period: String,
    pub status: String,
}

impl LoadReport {
    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }
}

impl Warehouse {
    /// Replace the fleet's raw table with the union of every readable period.
    ///
    /// A period that cannot be read is logged, recorded as skipped and the
    /// loop moves on. `fetch_delay` is slept between successive fetches.
    pub fn load_fleet(
        &self,
        fleet: Fleet,
        sources: &[PeriodSource],
        fetch_delay: Duration,
    ) -> Result<LoadReport, WarehouseError> {
        let table = fleet.table_name();
        self.in_transaction(|connection| {
            let drop = format!("DROP TABLE IF EXISTS {}", quote_identifier(table));
            connection.execute_batch(drop.as_str())?;
            set_fleet_cleaned(connection, fleet, false, &self.run_id)
        })?;
        info!(fleet = %fleet, periods = sources.len(), "loading trip files");

        let mut report = LoadReport {
            fleet,
            loaded: Vec::new(),
            skipped: Vec::new(),
            rows_total: 0,
        };

        for (index, source) in sources.iter().enumerate() {
            if index > 0 && !fetch_delay.is_zero() {
                thread::sleep(fetch_delay);
            }

            let created = !report.loaded.is_empty();
            match self.append_period(fleet, source, created) {
                Ok(rows_total) => {
                    report.rows_total = rows_total;
                    report.loaded.push(source.period);
                    info!(
                        fleet = %fleet,
                        period = %source.period,
                        rows_total,
                        "loaded trip file"
                    );
                    self.log_ingest(fleet, source, "loaded", Some(rows_total), None)?;
                }
                Err(error) => {
                    let reason = error.to_string();
                    warn!(
                        fleet = %fleet,
                        period = %source.period,
                        %reason,
                        "skipped trip file"
                    );
                    self.log_ingest(fleet, source, "skipped", None, Some(reason.as_str()))?;
                    report.skipped.push(SkippedPeriod {
                        period: source.period,
                        location: source.location.clone(),
                        reason,
                    });
                }
            }
        }

        info!(
            fleet = %fleet,
            loaded = report.loaded.len(),
            skipped = report.skipped.len(),
            rows_total = report.rows_total,
            "finished loading fleet"
        );
        Ok(report)
    }

    /// Read one period; the first success creates the table.
    fn append_period(
        &self,
        fleet: Fleet,
        source: &PeriodSource,
        table_exists: bool,
    ) -> Result<u64, WarehouseError> {
        let table = quote_identifier(fleet.table_name());
        let select = format!(
            "SELECT \
             CAST(VendorID AS BIGINT) AS vendor_id, \
             CAST({pickup} AS TIMESTAMP) AS {pickup}, \
             CAST({dropoff} AS TIMESTAMP) AS {dropoff}, \
             CAST(passenger_count AS BIGINT) AS passenger_count, \
             CAST(trip_distance AS DOUBLE) AS trip_distance, \
             CAST(total_amount AS DOUBLE) AS total_amount \
             FROM read_parquet('{location}')",
            pickup = fleet.source_pickup_column(),
            dropoff = fleet.source_dropoff_column(),
            location = escape_sql_string(&source.location),
        );

        let sql = if table_exists {
            format!("INSERT INTO {table} {select}")
        } else {
            format!("CREATE TABLE {table} AS {select}")
        };
        self.connection().execute_batch(sql.as_str())?;
        self.row_count(fleet.table_name())
    }

    fn log_ingest(
        &self,
        fleet: Fleet,
        source: &PeriodSource,
        status: &str,
        rows_total: Option<u64>,
        message: Option<&str>,
    ) -> Result<(), WarehouseError> {
        let period = source.period.label();
        let rows_total = rows_total.map(|rows| i64::try_from(rows).unwrap_or(i64::MAX));
        let params: [&dyn ToSql; 7] = [
            &self.run_id,
            &fleet.as_str(),
            &period,
            &source.location,
            &status,
            &rows_total,
            &message,
        ];
        self.connection().execute(
            "INSERT INTO ingest_log \
             (run_id, fleet, period, source, status, rows_total, message) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params.as_slice(),
        )?;
        Ok(())
    }

    /// Recreate the emissions reference table from a CSV file.
    ///
    /// Returns the number of vehicle classes loaded.
    pub fn load_emissions_factors(&self, csv_path: &Path) -> Result<u64, WarehouseError> {
        if !csv_path.is_file() {
            let error = io::Error::new(
                io::ErrorKind::NotFound,
                format!("emissions file '{}' not found", csv_path.display()),
            );
            error!(path = %csv_path.display(), "failed to load emissions factors");
            return Err(error.into());
        }

        self.drop_table(EMISSIONS_TABLE)?;
        let location = csv_path.to_string_lossy();
        let sql = format!(
            "CREATE TABLE {} AS SELECT * FROM read_csv_auto('{}')",
            quote_identifier(EMISSIONS_TABLE),
            escape_sql_string(&location)
        );
        self.connection().execute_batch(sql.as_str())?;

        let columns = self.column_names(EMISSIONS_TABLE)?;
        for required in EMISSIONS_COLUMNS {
            if !columns.iter().any(|column| column == required) {
                return Err(WarehouseError::MissingColumn {
                    table: EMISSIONS_TABLE.to_string(),
                    column: required.to_string(),
                });
            }
        }

        let rows = self.row_count(EMISSIONS_TABLE)?;
        info!(path = %csv_path.display(), rows, "loaded emissions factors");
        Ok(rows)
    }

    /// Ingest audit rows of the current run, oldest first.
    pub fn ingest_history(&self) -> Result<Vec<IngestEntry>, WarehouseError> {
        let mut statement = self.connection().prepare(
            "SELECT fleet, period, status FROM ingest_log \
             WHERE run_id = ? ORDER BY logged_at, fleet, period",
        )?;
        let rows = statement
            .query_map([self.run_id.as_str()], |row| {
                Ok(IngestEntry {
                    fleet: row.get(0)?,
                    period: row.get(1)?,
                    status: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::test_support::*;

    #[test]
    fn builds_one_source_per_month_in_order() {
        let sources = period_sources(DEFAULT_BASE_URL, Fleet::Green, 2023, 2024).expect("sources");
        assert_eq!(sources.len(), 24);
        assert_eq!(
            sources[0].location,
            "https://d37ci6vzurychx.cloudfront.net/trip-data/green_tripdata_2023-01.parquet"
        );
        assert_eq!(sources[23].period.label(), "2024-12");
    }

    #[test]
    fn inverted_year_range_is_rejected() {
        assert!(matches!(
            period_sources("/data/", Fleet::Yellow, 2024, 2023),
            Err(ValidationError::InvertedYearRange { .. })
        ));
    }

    #[test]
    fn trailing_slash_on_base_is_ignored() {
        let sources = period_sources("/data/", Fleet::Yellow, 2024, 2024).expect("sources");
        assert_eq!(sources[0].location, "/data/yellow_tripdata_2024-01.parquet");
    }

    #[test]
    fn missing_period_is_skipped_and_the_rest_still_load() {
        let (temp, warehouse) = open_temp();
        let dir = temp.path().join("trips");
        fs::create_dir_all(&dir).expect("dir");
        write_month(
            &dir,
            Fleet::Yellow,
            "2024-01",
            &[trip("2024-01-03 08:00:00", "2024-01-03 08:10:00", 1, 1.2, 9.0)],
        );
        write_month(
            &dir,
            Fleet::Yellow,
            "2024-03",
            &[
                trip("2024-03-03 08:00:00", "2024-03-03 08:10:00", 2, 2.2, 12.0),
                trip("2024-03-04 09:00:00", "2024-03-04 09:30:00", 1, 5.0, 25.0),
            ],
        );

        let sources: Vec<PeriodSource> =
            period_sources(&dir.to_string_lossy(), Fleet::Yellow, 2024, 2024)
                .expect("sources")
                .into_iter()
                .take(3)
                .collect();
        let report = warehouse
            .load_fleet(Fleet::Yellow, &sources, Duration::ZERO)
            .expect("load");

        assert_eq!(report.rows_total, 3);
        assert_eq!(report.loaded.len(), 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].period.label(), "2024-02");
        assert_eq!(
            warehouse.column_names("yellow_tripdata").expect("columns")[1],
            "tpep_pickup_datetime"
        );

        let history = warehouse.ingest_history().expect("history");
        let statuses: Vec<&str> = history.iter().map(|entry| entry.status.as_str()).collect();
        assert_eq!(statuses, vec!["loaded", "skipped", "loaded"]);
    }

    #[test]
    fn loading_replaces_previous_rows() {
        let (temp, warehouse) = open_temp();
        warehouse
            .ingest_trips(
                Fleet::Green,
                &[trip("2020-01-01 08:00:00", "2020-01-01 08:10:00", 1, 1.0, 5.0)],
            )
            .expect("seed");
        write_month(
            temp.path(),
            Fleet::Green,
            "2024-05",
            &[trip("2024-05-01 08:00:00", "2024-05-01 08:10:00", 1, 1.0, 5.0)],
        );
        let source = PeriodSource {
            period: Period::new(2024, 5).expect("period"),
            location: temp
                .path()
                .join("green_tripdata_2024-05.parquet")
                .to_string_lossy()
                .into_owned(),
        };

        let report = warehouse
            .load_fleet(Fleet::Green, &[source], Duration::ZERO)
            .expect("load");
        assert_eq!(report.rows_total, 1);
    }

    #[test]
    fn no_readable_period_leaves_no_table() {
        let (temp, warehouse) = open_temp();
        let sources = period_sources(&temp.path().to_string_lossy(), Fleet::Green, 2024, 2024)
            .expect("sources");
        let report = warehouse
            .load_fleet(Fleet::Green, &sources[..2], Duration::ZERO)
            .expect("load");

        assert!(report.is_empty());
        assert_eq!(
            warehouse.table_status("green_tripdata").expect("status"),
            crate::TableStatus::Missing
        );
    }

    #[test]
    fn loads_emissions_csv_and_checks_columns() {
        let (temp, warehouse) = open_temp();
        let good = temp.path().join("emissions.csv");
        fs::write(
            &good,
            "vehicle_type,co2_grams_per_mile\nyellow_taxi,261.0\ngreen_taxi,327.0\n",
        )
        .expect("csv");
        assert_eq!(warehouse.load_emissions_factors(&good).expect("load"), 2);

        let bad = temp.path().join("bad.csv");
        fs::write(&bad, "vehicle,grams\nyellow_taxi,261.0\n").expect("csv");
        assert!(matches!(
            warehouse.load_emissions_factors(&bad),
            Err(WarehouseError::MissingColumn { .. })
        ));
    }

    #[test]
    fn missing_emissions_file_is_an_io_error() {
        let (temp, warehouse) = open_temp();
        assert!(matches!(
            warehouse.load_emissions_factors(&temp.path().join("absent.csv")),
            Err(WarehouseError::Io(_))
        ));
    }
}
