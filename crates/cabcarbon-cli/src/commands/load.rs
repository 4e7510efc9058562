//! Load monthly trip files and the emissions factors into the warehouse.

use std::time::Duration;

use cabcarbon_core::report::{fleet_title, format_decimal, format_thousands};
use cabcarbon_warehouse::{period_sources, TableSummary, Warehouse};
use serde_json::json;
use tracing::{error, info_span};

use crate::cli::LoadArgs;
use crate::error::CliError;

use super::StageReport;

pub fn run(warehouse: &Warehouse, args: &LoadArgs) -> Result<StageReport, CliError> {
    let _stage = info_span!("stage", name = "load").entered();
    let mut report = StageReport::new("load");
    let delay = Duration::from_secs(args.fetch_delay_secs);
    let fleets = args.fleets.selected();

    let mut loads = Vec::new();
    for &fleet in &fleets {
        let sources = period_sources(&args.base_url, fleet, args.start_year, args.end_year)?;
        match warehouse.load_fleet(fleet, &sources, delay) {
            Ok(load) => {
                report.line(format!(
                    "{}: loaded {} of {} months, {} rows",
                    fleet_title(fleet),
                    load.loaded.len(),
                    sources.len(),
                    format_thousands(load.rows_total)
                ));
                for skipped in &load.skipped {
                    report.line(format!("   skipped {}: {}", skipped.period, skipped.reason));
                }
                if load.is_empty() {
                    report.fail(format!("{fleet}: no trip file could be loaded"));
                } else {
                    report.fleets.push(fleet);
                }
                loads.push(load);
            }
            Err(failure) => {
                error!(fleet = %fleet, error = %failure, "loading fleet failed");
                report.fail(format!("{fleet}: {failure}"));
            }
        }
    }

    let emissions_factors = match warehouse.load_emissions_factors(&args.emissions_csv) {
        Ok(rows) => {
            report.line(format!(
                "Loaded {rows} emissions factors from {}",
                args.emissions_csv.display()
            ));
            Some(rows)
        }
        Err(failure) => {
            error!(
                path = %args.emissions_csv.display(),
                error = %failure,
                "failed to load emissions factors"
            );
            report.fail(format!("emissions factors: {failure}"));
            None
        }
    };

    let mut summaries = Vec::new();
    for &fleet in &fleets {
        match warehouse.summarize_fleet(fleet) {
            Ok(Some(summary)) => {
                report.lines.extend(summary_lines(&summary));
                summaries.push(summary);
            }
            Ok(None) => report.line(format!("{}: No data loaded", fleet.table_name())),
            Err(failure) => report.fail(format!("could not summarize {fleet}: {failure}")),
        }
    }

    report.data = json!({
        "fleets": loads,
        "emissions_factors": emissions_factors,
        "summaries": summaries,
    });
    let produced = !report.fleets.is_empty();
    Ok(report.finish(produced))
}

fn or_na(value: Option<f64>, decimals: usize) -> String {
    value.map_or_else(|| String::from("n/a"), |value| format_decimal(value, decimals))
}

/// Descriptive block of one table.
pub fn summary_lines(summary: &TableSummary) -> Vec<String> {
    vec![
        format!("--- Summary for {} ---", summary.table),
        format!("Total trips: {}", format_thousands(summary.total_trips)),
        format!(
            "Total passengers: {}",
            format_thousands(summary.total_passengers.max(0) as u64)
        ),
        format!(
            "Average trip distance: {} miles",
            or_na(summary.avg_trip_distance, 2)
        ),
        format!("Average trip time: {} minutes", or_na(summary.avg_trip_minutes, 2)),
        format!(
            "Average passengers per trip: {}",
            or_na(summary.avg_passengers_per_trip, 2)
        ),
        format!("Average total amount: ${}", or_na(summary.avg_total_amount, 2)),
        format!(
            "Pickups from {} to {}",
            summary.earliest_pickup.as_deref().unwrap_or("n/a"),
            summary.latest_pickup.as_deref().unwrap_or("n/a")
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_block_formats_numbers() {
        let summary = TableSummary {
            table: "yellow_tripdata".into(),
            total_trips: 1_234_567,
            total_passengers: 2_000_000,
            avg_trip_distance: Some(3.456),
            avg_trip_minutes: Some(15.0),
            avg_passengers_per_trip: Some(1.62),
            avg_total_amount: None,
            earliest_pickup: Some("2024-01-01 00:00:05".into()),
            latest_pickup: None,
        };
        let lines = summary_lines(&summary);
        assert_eq!(lines[0], "--- Summary for yellow_tripdata ---");
        assert_eq!(lines[1], "Total trips: 1,234,567");
        assert_eq!(lines[3], "Average trip distance: 3.46 miles");
        assert_eq!(lines[6], "Average total amount: $n/a");
        assert_eq!(lines[7], "Pickups from 2024-01-01 00:00:05 to n/a");
    }
}
