use cabcarbon_core::report::{clean_summary, format_thousands};
use cabcarbon_core::{CleaningRules, Fleet};
use cabcarbon_warehouse::Warehouse;
use tracing::{error, info_span};

use crate::error::CliError;

use super::StageReport;

pub fn run(
    warehouse: &Warehouse,
    fleets: &[Fleet],
    rules: &CleaningRules,
) -> Result<StageReport, CliError> {
    rules.validate()?;
    let _stage = info_span!("stage", name = "clean").entered();
    let mut report = StageReport::new("clean");

    let mut cleaned = Vec::new();
    for &fleet in fleets {
        match warehouse.clean_fleet(fleet, rules) {
            Ok(result) => {
                report.line(clean_summary(fleet, &result.stats));
                if result.duplicates_removed > 0 {
                    report.line(format!(
                        "   duplicates: {}",
                        format_thousands(result.duplicates_removed)
                    ));
                }
                for outcome in result.rules.iter().filter(|outcome| outcome.removed > 0) {
                    report.line(format!(
                        "   {}: {}",
                        outcome.rule.name(),
                        format_thousands(outcome.removed)
                    ));
                }
                report.fleets.push(fleet);
                cleaned.push(result);
            }
            Err(failure) => {
                error!(fleet = %fleet, error = %failure, "cleaning failed");
                report.fail(format!("{fleet}: {failure}"));
            }
        }
    }

    report.data = serde_json::to_value(&cleaned)?;
    let produced = !report.fleets.is_empty();
    Ok(report.finish(produced))
}
