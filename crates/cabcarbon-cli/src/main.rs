mod chart;
mod cli;
mod commands;
mod error;
mod logging;
mod output;

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, info_span};
use uuid::Uuid;

use crate::cli::Cli;
use crate::commands::Settings;
use crate::error::CliError;

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

fn run() -> Result<ExitCode, CliError> {
    let cli = Cli::parse();
    let settings = Settings::from_cli(&cli);
    let _log_guard = logging::init(&settings.log_file)?;

    let run_id = Uuid::new_v4().to_string();
    let span = info_span!("cabcarbon", run_id = %run_id);
    let _entered = span.enter();
    info!(
        db_path = %settings.warehouse.db_path.display(),
        log_file = %settings.log_file.display(),
        "starting"
    );

    let outcome = commands::run(&cli, &settings, &run_id)
        .inspect_err(|failure| error!(error = %failure, "command failed"))?;
    output::render(&outcome, cli.format, cli.pretty)?;

    if outcome.has_failures() {
        return Ok(ExitCode::from(3));
    }

    Ok(ExitCode::SUCCESS)
}
