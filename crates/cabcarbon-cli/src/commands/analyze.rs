//! Largest trips and grouped CO₂ patterns per fleet.

use cabcarbon_core::report::{
    extremum_lines, fleet_header, fleet_title, format_decimal, section_title, series_lines,
};
use cabcarbon_core::{Fleet, GroupKey};
use cabcarbon_warehouse::{LargestTrip, Warehouse, TRANSFORMED_TABLE};
use serde_json::json;
use tracing::{error, info_span};

use crate::error::CliError;

use super::StageReport;

pub fn run(
    warehouse: &Warehouse,
    fleets: &[Fleet],
    group_keys: &[GroupKey],
) -> Result<StageReport, CliError> {
    let _stage = info_span!("stage", name = "analyze").entered();
    let mut report = StageReport::new("analyze");

    if !warehouse.table_status(TRANSFORMED_TABLE)?.is_populated() {
        report.fail(format!("no data in '{TRANSFORMED_TABLE}', run transform first"));
        return Ok(report.finish(false));
    }

    report.line("Single largest carbon trips");
    let mut largest = Vec::new();
    for &fleet in fleets {
        match warehouse.largest_trip(fleet) {
            Ok(Some(trip)) => {
                report.line(largest_trip_line(&trip));
                largest.push(trip);
            }
            Ok(None) => report.line(format!("{}: no trips", fleet_title(fleet))),
            Err(failure) => {
                error!(fleet = %fleet, error = %failure, "largest trip query failed");
                report.fail(format!("{fleet}: {failure}"));
            }
        }
    }

    let mut series_data = Vec::new();
    for &key in group_keys {
        report.line(section_title(key));
        for &fleet in fleets {
            report.line(fleet_header(fleet));
            match warehouse.aggregate(fleet, key) {
                Ok(series) => {
                    report.lines.extend(series_lines(&series));
                    report.lines.extend(extremum_lines(&series));
                    if !series.is_empty() && !report.fleets.contains(&fleet) {
                        report.fleets.push(fleet);
                    }
                    series_data.push(json!({
                        "fleet": fleet,
                        "group_key": key,
                        "rows": series.rows,
                        "min_group": series.min_group(),
                        "max_group": series.max_group(),
                    }));
                }
                Err(failure) => {
                    error!(
                        fleet = %fleet,
                        group_key = key.noun(),
                        error = %failure,
                        "aggregation failed"
                    );
                    report.fail(format!("{fleet} by {}: {failure}", key.noun()));
                }
            }
        }
    }

    report.data = json!({
        "largest_trips": largest,
        "series": series_data,
    });
    let produced = !report.fleets.is_empty();
    Ok(report.finish(produced))
}

fn largest_trip_line(trip: &LargestTrip) -> String {
    let amount = trip
        .total_amount
        .map_or_else(|| String::from("n/a"), |amount| format_decimal(amount, 2));
    let distance = trip
        .trip_distance
        .map_or_else(|| String::from("n/a"), |miles| format_decimal(miles, 2));
    format!(
        "{}: {:.4} kg CO2 over {distance} miles (${amount}), vendor {}, {} to {}",
        fleet_title(trip.fleet),
        trip.co2_emissions_kg,
        trip.vendor_id
            .map_or_else(|| String::from("n/a"), |vendor| vendor.to_string()),
        trip.pickup_datetime.as_deref().unwrap_or("n/a"),
        trip.dropoff_datetime.as_deref().unwrap_or("n/a"),
    )
}
