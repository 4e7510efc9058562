//! Descriptive statistics of a fleet table.

use cabcarbon_core::{Fleet, DROPOFF_COLUMN, PICKUP_COLUMN};
use serde::Serialize;
use tracing::{info, warn};

use crate::{quote_identifier, Warehouse, WarehouseError};

/// Totals and averages over the trips with both timestamps present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSummary {
    pub table: String,
    pub total_trips: u64,
    pub total_passengers: i64,
    pub avg_trip_distance: Option<f64>,
    pub avg_trip_minutes: Option<f64>,
    pub avg_passengers_per_trip: Option<f64>,
    pub avg_total_amount: Option<f64>,
    pub earliest_pickup: Option<String>,
    pub latest_pickup: Option<String>,
}

impl Warehouse {
    /// Summarize the fleet's table, or `None` when it is missing or empty.
    ///
    /// Works before and after normalization.
    pub fn summarize_fleet(&self, fleet: Fleet) -> Result<Option<TableSummary>, WarehouseError> {
        let table = fleet.table_name();
        if !self.table_status(table)?.is_populated() {
            warn!(fleet = %fleet, table, "no data loaded");
            return Ok(None);
        }

        let columns = self.column_names(table)?;
        let pick = |canonical: &str, source: &str| -> Result<String, WarehouseError> {
            [canonical, source]
                .into_iter()
                .find(|name| columns.iter().any(|column| column == name))
                .map(quote_identifier)
                .ok_or_else(|| WarehouseError::MissingColumn {
                    table: table.to_string(),
                    column: canonical.to_string(),
                })
        };
        let pickup = pick(PICKUP_COLUMN, fleet.source_pickup_column())?;
        let dropoff = pick(DROPOFF_COLUMN, fleet.source_dropoff_column())?;

        let sql = format!(
            "SELECT \
             COUNT(*), \
             CAST(COALESCE(SUM(passenger_count), 0) AS BIGINT), \
             AVG(trip_distance), \
             AVG(date_diff('minute', {pickup}, {dropoff})), \
             AVG(passenger_count), \
             AVG(total_amount), \
             strftime(MIN({pickup}), '%Y-%m-%d %H:%M:%S'), \
             strftime(MAX({pickup}), '%Y-%m-%d %H:%M:%S') \
             FROM {table_sql} \
             WHERE {pickup} IS NOT NULL AND {dropoff} IS NOT NULL",
            table_sql = quote_identifier(table),
        );

        let summary = self.connection().query_row(sql.as_str(), [], |row| {
            let trips: i64 = row.get(0)?;
            Ok(TableSummary {
                table: table.to_string(),
                total_trips: trips.max(0) as u64,
                total_passengers: row.get(1)?,
                avg_trip_distance: row.get(2)?,
                avg_trip_minutes: row.get(3)?,
                avg_passengers_per_trip: row.get(4)?,
                avg_total_amount: row.get(5)?,
                earliest_pickup: row.get(6)?,
                latest_pickup: row.get(7)?,
            })
        })?;

        info!(
            table,
            total_trips = summary.total_trips,
            total_passengers = summary.total_passengers,
            "summarized table"
        );
        Ok(Some(summary))
    }
}
