//! Per-trip CO₂ estimation and calendar bucketing.

use ::duckdb::params_from_iter;
use ::duckdb::types::Value as DuckValue;
use cabcarbon_core::Fleet;
use serde::Serialize;
use tracing::{info, warn};

use crate::{quote_identifier, Warehouse, WarehouseError};

/// Clean trips of every fleet with their emissions estimate.
pub const TRANSFORMED_TABLE: &str = "all_data_transformed";
/// Grams of CO₂ per mile for each vehicle class.
pub const EMISSIONS_TABLE: &str = "vehicle_emissions";

const TRANSFORMED_SCHEMA: &str = "\
    cab_type VARCHAR NOT NULL, \
    vendor_id BIGINT, \
    pickup_datetime TIMESTAMP, \
    dropoff_datetime TIMESTAMP, \
    passenger_count BIGINT, \
    trip_distance DOUBLE, \
    total_amount DOUBLE, \
    co2_emissions_kg DOUBLE, \
    hour_of_day BIGINT, \
    day_of_week BIGINT, \
    week_of_year BIGINT, \
    month_of_year BIGINT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FleetRows {
    pub fleet: Fleet,
    pub rows: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransformReport {
    pub fleets: Vec<FleetRows>,
    /// Fleets left out for lack of trips or of an emissions factor.
    pub skipped: Vec<Fleet>,
}

impl TransformReport {
    pub fn rows_total(&self) -> u64 {
        self.fleets.iter().map(|entry| entry.rows).sum()
    }

    pub fn contains(&self, fleet: Fleet) -> bool {
        self.fleets.iter().any(|entry| entry.fleet == fleet)
    }
}

impl Warehouse {
    /// Recreate the transformed table from the clean fleet tables.
    ///
    /// `co2_emissions_kg = trip_distance * co2_grams_per_mile / 1000`, and the
    /// calendar columns are taken from the pickup time.
    pub fn build_transformed(&self, fleets: &[Fleet]) -> Result<TransformReport, WarehouseError> {
        if !self.table_status(EMISSIONS_TABLE)?.is_populated() {
            return Err(WarehouseError::NoData {
                table: EMISSIONS_TABLE.to_string(),
            });
        }

        let mut included = Vec::new();
        let mut skipped = Vec::new();
        for &fleet in fleets {
            if self.fleet_is_transformable(fleet)? {
                included.push(fleet);
            } else {
                skipped.push(fleet);
            }
        }
        if included.is_empty() {
            return Err(WarehouseError::NoData {
                table: TRANSFORMED_TABLE.to_string(),
            });
        }

        let selects: Vec<String> = included.iter().map(|&fleet| fleet_select(fleet)).collect();
        let insert = format!(
            "INSERT INTO {} {}",
            quote_identifier(TRANSFORMED_TABLE),
            selects.join(" UNION ALL ")
        );
        let values: Vec<DuckValue> = included
            .iter()
            .flat_map(|fleet| {
                [
                    DuckValue::Text(fleet.as_str().to_string()),
                    DuckValue::Text(fleet.vehicle_class().to_string()),
                ]
            })
            .collect();

        self.drop_table(TRANSFORMED_TABLE)?;
        self.in_transaction(|connection| {
            connection.execute_batch(
                format!(
                    "CREATE TABLE {} ({TRANSFORMED_SCHEMA})",
                    quote_identifier(TRANSFORMED_TABLE)
                )
                .as_str(),
            )?;
            connection.execute(insert.as_str(), params_from_iter(values.iter()))?;
            Ok(())
        })?;

        let mut counts = Vec::with_capacity(included.len());
        for fleet in included {
            let rows = self.transformed_rows(fleet)?;
            info!(fleet = %fleet, rows, "estimated trip emissions");
            counts.push(FleetRows { fleet, rows });
        }

        Ok(TransformReport {
            fleets: counts,
            skipped,
        })
    }

    fn fleet_is_transformable(&self, fleet: Fleet) -> Result<bool, WarehouseError> {
        if !self.table_status(fleet.table_name())?.is_populated() {
            warn!(fleet = %fleet, "no clean trips, skipping fleet");
            return Ok(false);
        }
        if !self.is_cleaned(fleet)? {
            warn!(fleet = %fleet, "trips not cleaned since last load, skipping fleet");
            return Ok(false);
        }
        self.normalize_timestamp_columns(fleet)?;

        let factors: i64 = self.connection().query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE vehicle_type = ?",
                quote_identifier(EMISSIONS_TABLE)
            ),
            [fleet.vehicle_class()],
            |row| row.get(0),
        )?;
        match factors {
            0 => {
                warn!(
                    fleet = %fleet,
                    vehicle_type = fleet.vehicle_class(),
                    "no emissions factor, skipping fleet"
                );
                Ok(false)
            }
            1 => Ok(true),
            _ => Err(WarehouseError::QueryRejected(format!(
                "{factors} emissions factors for vehicle type '{}'",
                fleet.vehicle_class()
            ))),
        }
    }

    /// Rows of the transformed table belonging to `fleet`.
    pub fn transformed_rows(&self, fleet: Fleet) -> Result<u64, WarehouseError> {
        let count: i64 = self.connection().query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE cab_type = ?",
                quote_identifier(TRANSFORMED_TABLE)
            ),
            [fleet.as_str()],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

/// One branch of the union; binds the cab type and the vehicle class.
fn fleet_select(fleet: Fleet) -> String {
    format!(
        "SELECT \
         CAST(? AS VARCHAR) AS cab_type, \
         t.vendor_id, \
         t.pickup_datetime, \
         t.dropoff_datetime, \
         t.passenger_count, \
         t.trip_distance, \
         t.total_amount, \
         t.trip_distance * CAST(e.co2_grams_per_mile AS DOUBLE) / 1000.0 AS co2_emissions_kg, \
         hour(t.pickup_datetime) AS hour_of_day, \
         dayofweek(t.pickup_datetime) AS day_of_week, \
         weekofyear(t.pickup_datetime) AS week_of_year, \
         month(t.pickup_datetime) AS month_of_year \
         FROM {} AS t \
         JOIN {} AS e ON e.vehicle_type = ?",
        quote_identifier(fleet.table_name()),
        quote_identifier(EMISSIONS_TABLE)
    )
}

#[cfg(test)]
mod tests {
    use std::fs;

    use cabcarbon_core::{CleaningRules, TripRecord};

    use super::*;
    use crate::test_support::*;

    fn load_factors(warehouse: &Warehouse, dir: &std::path::Path, body: &str) {
        let path = dir.join("factors.csv");
        fs::write(&path, body).expect("csv");
        warehouse.load_emissions_factors(&path).expect("factors");
    }

    fn seed(warehouse: &Warehouse, fleet: Fleet, rows: &[TripRecord]) {
        warehouse.ingest_trips(fleet, rows).expect("ingest");
        warehouse
            .clean_fleet(fleet, &CleaningRules::default())
            .expect("clean");
    }

    #[test]
    fn estimates_co2_from_distance_and_factor() {
        let (temp, warehouse) = open_temp();
        load_factors(
            &warehouse,
            temp.path(),
            "vehicle_type,co2_grams_per_mile\nyellow_taxi,250.0\ngreen_taxi,400.0\n",
        );
        seed(
            &warehouse,
            Fleet::Yellow,
            &[trip("2024-01-07 08:30:00", "2024-01-07 08:50:00", 1, 4.0, 20.0)],
        );
        seed(
            &warehouse,
            Fleet::Green,
            &[trip("2024-03-15 23:10:00", "2024-03-15 23:40:00", 1, 10.0, 30.0)],
        );

        let report = warehouse.build_transformed(&Fleet::ALL).expect("transform");
        assert_eq!(report.rows_total(), 2);
        assert!(report.skipped.is_empty());

        let (co2, hour, dow, week, month): (f64, i64, i64, i64, i64) = warehouse
            .connection()
            .query_row(
                "SELECT co2_emissions_kg, hour_of_day, day_of_week, week_of_year, month_of_year \
                 FROM all_data_transformed WHERE cab_type = 'yellow'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .expect("yellow row");
        assert!((co2 - 1.0).abs() < 1e-9);
        assert_eq!((hour, dow, week, month), (8, 0, 1, 1));

        let green_co2: f64 = warehouse
            .connection()
            .query_row(
                "SELECT co2_emissions_kg FROM all_data_transformed WHERE cab_type = 'green'",
                [],
                |row| row.get(0),
            )
            .expect("green row");
        assert!((green_co2 - 4.0).abs() < 1e-9);
    }

    #[test]
    fn uncleaned_trips_are_not_estimated() {
        let (temp, warehouse) = open_temp();
        load_factors(
            &warehouse,
            temp.path(),
            "vehicle_type,co2_grams_per_mile\nyellow_taxi,250.0\ngreen_taxi,400.0\n",
        );
        seed(
            &warehouse,
            Fleet::Green,
            &[trip("2024-03-15 10:00:00", "2024-03-15 10:20:00", 1, 2.0, 12.0)],
        );
        warehouse
            .ingest_trips(
                Fleet::Yellow,
                &[
                    trip("2024-01-07 08:30:00", "2024-01-07 08:50:00", 1, 4.0, 20.0),
                    trip("2024-01-07 09:30:00", "2024-01-07 09:50:00", 0, 4.0, 20.0),
                    trip("2024-01-07 10:30:00", "2024-01-07 10:50:00", 1, 4.0, -15.0),
                ],
            )
            .expect("ingest");
        assert!(!warehouse.is_cleaned(Fleet::Yellow).expect("state"));

        let report = warehouse.build_transformed(&Fleet::ALL).expect("transform");
        assert_eq!(report.skipped, vec![Fleet::Yellow]);
        assert_eq!(warehouse.transformed_rows(Fleet::Yellow).expect("rows"), 0);

        warehouse
            .clean_fleet(Fleet::Yellow, &CleaningRules::default())
            .expect("clean");
        assert!(warehouse.is_cleaned(Fleet::Yellow).expect("state"));
        warehouse.build_transformed(&Fleet::ALL).expect("transform");
        assert_eq!(warehouse.transformed_rows(Fleet::Yellow).expect("rows"), 1);
    }

    #[test]
    fn appending_trips_invalidates_a_clean() {
        let (_temp, warehouse) = open_temp();
        seed(
            &warehouse,
            Fleet::Green,
            &[trip("2024-03-15 10:00:00", "2024-03-15 10:20:00", 1, 2.0, 12.0)],
        );
        assert!(warehouse.is_cleaned(Fleet::Green).expect("state"));

        warehouse
            .ingest_trips(
                Fleet::Green,
                &[trip("2024-03-16 10:00:00", "2024-03-16 10:20:00", 0, 2.0, 12.0)],
            )
            .expect("append");
        assert!(!warehouse.is_cleaned(Fleet::Green).expect("state"));
    }

    #[test]
    fn fleet_without_trips_is_skipped() {
        let (temp, warehouse) = open_temp();
        load_factors(
            &warehouse,
            temp.path(),
            "vehicle_type,co2_grams_per_mile\nyellow_taxi,250.0\ngreen_taxi,400.0\n",
        );
        seed(
            &warehouse,
            Fleet::Green,
            &[trip("2024-03-15 10:00:00", "2024-03-15 10:20:00", 1, 2.0, 12.0)],
        );

        let report = warehouse.build_transformed(&Fleet::ALL).expect("transform");
        assert_eq!(report.skipped, vec![Fleet::Yellow]);
        assert!(report.contains(Fleet::Green));
    }

    #[test]
    fn missing_emissions_table_is_no_data() {
        let (_temp, warehouse) = open_temp();
        seed(
            &warehouse,
            Fleet::Yellow,
            &[trip("2024-01-07 08:30:00", "2024-01-07 08:50:00", 1, 4.0, 20.0)],
        );
        assert!(matches!(
            warehouse.build_transformed(&Fleet::ALL),
            Err(WarehouseError::NoData { table }) if table == EMISSIONS_TABLE
        ));
    }

    #[test]
    fn ambiguous_factor_is_rejected() {
        let (temp, warehouse) = open_temp();
        load_factors(
            &warehouse,
            temp.path(),
            "vehicle_type,co2_grams_per_mile\nyellow_taxi,250.0\nyellow_taxi,300.0\n",
        );
        seed(
            &warehouse,
            Fleet::Yellow,
            &[trip("2024-01-07 08:30:00", "2024-01-07 08:50:00", 1, 4.0, 20.0)],
        );
        assert!(matches!(
            warehouse.build_transformed(&[Fleet::Yellow]),
            Err(WarehouseError::QueryRejected(_))
        ));
    }
}
