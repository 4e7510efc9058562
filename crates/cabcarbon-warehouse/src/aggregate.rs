//! Grouped emissions queries over the transformed table.

use cabcarbon_core::{AggregateRow, AggregateSeries, Fleet, GroupKey};
use serde::Serialize;
use tracing::debug;

use crate::estimator::TRANSFORMED_TABLE;
use crate::{quote_identifier, Warehouse, WarehouseError};

/// The single highest-emission trip of a fleet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LargestTrip {
    pub fleet: Fleet,
    pub vendor_id: Option<i64>,
    pub pickup_datetime: Option<String>,
    pub dropoff_datetime: Option<String>,
    pub trip_distance: Option<f64>,
    pub total_amount: Option<f64>,
    pub co2_emissions_kg: f64,
}

impl Warehouse {
    /// Sum, count and mean of `co2_emissions_kg` per group for one fleet,
    /// ascending by reported key. Groups without trips are absent.
    pub fn aggregate(&self, fleet: Fleet, key: GroupKey) -> Result<AggregateSeries, WarehouseError> {
        let sql = format!(
            "SELECT {expr} AS group_key, \
             ROUND(SUM(co2_emissions_kg), 2) AS total_co2_kg, \
             COUNT(*) AS trips, \
             ROUND(AVG(co2_emissions_kg), 4) AS avg_co2_per_trip \
             FROM {table} \
             WHERE cab_type = ? AND {column} IS NOT NULL \
             GROUP BY group_key \
             ORDER BY group_key",
            expr = key.select_expression(),
            column = key.column(),
            table = quote_identifier(TRANSFORMED_TABLE),
        );

        let mut statement = self.connection().prepare(sql.as_str())?;
        let rows = statement
            .query_map([fleet.as_str()], |row| {
                let trips: i64 = row.get(2)?;
                Ok(AggregateRow {
                    key: row.get(0)?,
                    total_co2_kg: row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                    trip_count: trips.max(0) as u64,
                    avg_co2_per_trip: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        debug!(fleet = %fleet, group_key = key.noun(), groups = rows.len(), "aggregated");
        Ok(AggregateSeries::new(key, rows))
    }

    /// Highest `co2_emissions_kg` trip of the fleet; earliest pickup wins ties.
    pub fn largest_trip(&self, fleet: Fleet) -> Result<Option<LargestTrip>, WarehouseError> {
        let sql = format!(
            "SELECT vendor_id, \
             strftime(pickup_datetime, '%Y-%m-%d %H:%M:%S'), \
             strftime(dropoff_datetime, '%Y-%m-%d %H:%M:%S'), \
             trip_distance, total_amount, co2_emissions_kg \
             FROM {} \
             WHERE cab_type = ? AND co2_emissions_kg IS NOT NULL \
             ORDER BY co2_emissions_kg DESC, pickup_datetime \
             LIMIT 1",
            quote_identifier(TRANSFORMED_TABLE)
        );

        let mut statement = self.connection().prepare(sql.as_str())?;
        let mut rows = statement.query_map([fleet.as_str()], |row| {
            Ok(LargestTrip {
                fleet,
                vendor_id: row.get(0)?,
                pickup_datetime: row.get(1)?,
                dropoff_datetime: row.get(2)?,
                trip_distance: row.get(3)?,
                total_amount: row.get(4)?,
                co2_emissions_kg: row.get(5)?,
            })
        })?;
        let largest = rows.next().transpose()?;
        Ok(largest)
    }

    /// Unrounded CO₂ per calendar month in metric tons, January first.
    /// Months without trips are zero.
    pub fn monthly_totals_tons(&self, fleet: Fleet) -> Result<[f64; 12], WarehouseError> {
        let sql = format!(
            "SELECT month_of_year, SUM(co2_emissions_kg) / 1000.0 \
             FROM {} \
             WHERE cab_type = ? AND month_of_year IS NOT NULL \
             GROUP BY month_of_year",
            quote_identifier(TRANSFORMED_TABLE)
        );

        let mut statement = self.connection().prepare(sql.as_str())?;
        let rows = statement
            .query_map([fleet.as_str()], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, Option<f64>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut totals = [0.0; 12];
        for (month, tons) in rows {
            if let Some(slot) = usize::try_from(month - 1)
                .ok()
                .and_then(|index| totals.get_mut(index))
            {
                *slot = tons.unwrap_or(0.0);
            }
        }
        Ok(totals)
    }
}
