//! The whole pipeline: each stage only sees the fleets the previous one
//! produced, and a stage with nothing to work on is skipped.

use cabcarbon_core::{GroupKey, Period};
use cabcarbon_warehouse::Warehouse;
use tracing::{error, info};

use crate::cli::RunArgs;
use crate::error::CliError;

use super::{analyze, clean, load, plot, transform, StageReport};

pub fn run(warehouse: &Warehouse, args: &RunArgs) -> Result<Vec<StageReport>, CliError> {
    let rules = args.thresholds.rules();
    rules.validate()?;
    Period::range(args.load.start_year, args.load.end_year)?;

    let mut stages = Vec::with_capacity(5);

    let loaded = guarded("load", load::run(warehouse, &args.load));
    let loaded_fleets = loaded.fleets.clone();
    stages.push(loaded);

    let cleaned = if loaded_fleets.is_empty() {
        StageReport::skipped("clean", "no fleet was loaded")
    } else {
        guarded("clean", clean::run(warehouse, &loaded_fleets, &rules))
    };
    let cleaned_fleets = cleaned.fleets.clone();
    stages.push(cleaned);

    let transformed = if cleaned_fleets.is_empty() {
        StageReport::skipped("transform", "no fleet was cleaned")
    } else {
        guarded("transform", transform::run(warehouse, &cleaned_fleets))
    };
    let transformed_fleets = transformed.fleets.clone();
    stages.push(transformed);

    if transformed_fleets.is_empty() {
        stages.push(StageReport::skipped("analyze", "no emissions were estimated"));
        stages.push(StageReport::skipped("plot", "no emissions were estimated"));
    } else {
        stages.push(guarded(
            "analyze",
            analyze::run(warehouse, &transformed_fleets, &GroupKey::ALL),
        ));
        stages.push(guarded("plot", plot::run(warehouse, &args.output)));
    }

    let failed = stages.iter().filter(|stage| !stage.succeeded()).count();
    info!(stages = stages.len(), failed, "pipeline finished");
    Ok(stages)
}

/// Turn a stage error into a failed stage so later stages still get a verdict.
fn guarded(stage: &'static str, result: Result<StageReport, CliError>) -> StageReport {
    match result {
        Ok(report) => report,
        Err(failure) => {
            error!(stage, error = %failure, "stage failed");
            let mut report = StageReport::new(stage);
            report.fail(failure.to_string());
            report.finish(false)
        }
    }
}
