use std::path::Path;

use cabcarbon_core::Fleet;
use cabcarbon_warehouse::{Warehouse, TRANSFORMED_TABLE};
use serde_json::json;
use tracing::{info, info_span};

use crate::chart::{render_monthly_chart, MonthlySeries};
use crate::error::CliError;

use super::StageReport;

pub fn run(warehouse: &Warehouse, output: &Path) -> Result<StageReport, CliError> {
    let _stage = info_span!("stage", name = "plot").entered();
    let mut report = StageReport::new("plot");

    if !warehouse.table_status(TRANSFORMED_TABLE)?.is_populated() {
        report.fail(format!("no data in '{TRANSFORMED_TABLE}', run transform first"));
        return Ok(report.finish(false));
    }

    let mut series = Vec::with_capacity(Fleet::ALL.len());
    for fleet in Fleet::ALL {
        let tons = warehouse.monthly_totals_tons(fleet)?;
        if tons.iter().any(|value| *value > 0.0) {
            report.fleets.push(fleet);
        }
        series.push(MonthlySeries { fleet, tons });
    }

    render_monthly_chart(output, &series)?;
    info!(path = %output.display(), "saved monthly chart");
    report.line(format!("Chart saved to {}", output.display()));

    report.data = json!({
        "path": output,
        "monthly_tons": series
            .iter()
            .map(|entry| json!({ "fleet": entry.fleet, "tons": entry.tons }))
            .collect::<Vec<_>>(),
    });
    Ok(report.finish(true))
}
