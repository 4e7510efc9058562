use cabcarbon_core::report::{fleet_title, format_thousands};
use cabcarbon_core::Fleet;
use cabcarbon_warehouse::Warehouse;
use tracing::{error, info_span};

use crate::error::CliError;

use super::StageReport;

pub fn run(warehouse: &Warehouse, fleets: &[Fleet]) -> Result<StageReport, CliError> {
    let _stage = info_span!("stage", name = "transform").entered();
    let mut report = StageReport::new("transform");

    match warehouse.build_transformed(fleets) {
        Ok(result) => {
            for entry in &result.fleets {
                report.line(format!(
                    "{}: {} trips with CO2 estimates",
                    fleet_title(entry.fleet),
                    format_thousands(entry.rows)
                ));
                report.fleets.push(entry.fleet);
            }
            for &fleet in &result.skipped {
                report.line(format!(
                    "{}: skipped, no clean trips or emissions factor",
                    fleet_title(fleet)
                ));
            }
            report.data = serde_json::to_value(&result)?;
        }
        Err(failure) => {
            error!(error = %failure, "building transformed table failed");
            report.fail(failure.to_string());
        }
    }

    let produced = !report.fleets.is_empty();
    Ok(report.finish(produced))
}
