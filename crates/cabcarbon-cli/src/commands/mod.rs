mod analyze;
mod clean;
mod load;
mod plot;
mod run;
mod transform;

use std::path::PathBuf;

use cabcarbon_core::Fleet;
use cabcarbon_warehouse::{Warehouse, WarehouseConfig};
use serde::Serialize;
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Paths resolved from the global flags.
#[derive(Debug, Clone)]
pub struct Settings {
    pub warehouse: WarehouseConfig,
    pub log_file: PathBuf,
}

impl Settings {
    pub fn from_cli(cli: &Cli) -> Self {
        let mut warehouse = match &cli.home {
            Some(home) => WarehouseConfig::with_home(home),
            None => WarehouseConfig::default(),
        };
        if let Some(db_path) = &cli.db_path {
            warehouse.db_path = db_path.clone();
        }
        let log_file = cli
            .log_file
            .clone()
            .unwrap_or_else(|| warehouse.home.join("cabcarbon.log"));
        Self {
            warehouse,
            log_file,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    Failed,
    Skipped,
}

/// Result of one pipeline stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: &'static str,
    pub status: StageStatus,
    /// Fleets the stage produced data for; downstream stages only see these.
    pub fleets: Vec<Fleet>,
    pub failures: Vec<String>,
    pub data: Value,
    #[serde(skip)]
    pub lines: Vec<String>,
}

impl StageReport {
    pub fn new(stage: &'static str) -> Self {
        Self {
            stage,
            status: StageStatus::Completed,
            fleets: Vec::new(),
            failures: Vec::new(),
            data: Value::Null,
            lines: Vec::new(),
        }
    }

    pub fn skipped(stage: &'static str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let mut report = Self::new(stage);
        report.status = StageStatus::Skipped;
        report.lines.push(format!("{stage} skipped: {reason}"));
        report.failures.push(reason);
        report
    }

    /// Record a failure without stopping the stage.
    pub fn fail(&mut self, failure: impl Into<String>) {
        let failure = failure.into();
        self.lines.push(format!("error: {failure}"));
        self.failures.push(failure);
    }

    pub fn line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Failed when nothing usable came out of the stage.
    pub fn finish(mut self, produced_anything: bool) -> Self {
        if !produced_anything {
            self.status = StageStatus::Failed;
        }
        self
    }

    pub fn succeeded(&self) -> bool {
        self.status == StageStatus::Completed
    }
}

/// Everything a command produced, rendered by [`crate::output`].
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutcome {
    pub command: &'static str,
    pub run_id: String,
    pub stages: Vec<StageReport>,
}

impl CommandOutcome {
    pub fn has_failures(&self) -> bool {
        self.stages
            .iter()
            .any(|stage| stage.status != StageStatus::Completed || !stage.failures.is_empty())
    }
}

pub fn run(cli: &Cli, settings: &Settings, run_id: &str) -> Result<CommandOutcome, CliError> {
    let open_writable = || -> Result<Warehouse, CliError> {
        Ok(Warehouse::open(settings.warehouse.clone())?.with_run_id(run_id))
    };
    let open_read_only = || -> Result<Warehouse, CliError> {
        Ok(Warehouse::open_read_only(settings.warehouse.clone())?.with_run_id(run_id))
    };

    let (command, stages) = match &cli.command {
        Command::Load(args) => ("load", vec![load::run(&open_writable()?, args)?]),
        Command::Clean(args) => (
            "clean",
            vec![clean::run(
                &open_writable()?,
                &args.fleets.selected(),
                &args.thresholds.rules(),
            )?],
        ),
        Command::Transform(args) => (
            "transform",
            vec![transform::run(&open_writable()?, &args.selected())?],
        ),
        Command::Analyze(args) => (
            "analyze",
            vec![analyze::run(
                &open_read_only()?,
                &args.fleets.selected(),
                &args.group_keys(),
            )?],
        ),
        Command::Plot(args) => ("plot", vec![plot::run(&open_read_only()?, &args.output)?]),
        Command::Run(args) => ("run", run::run(&open_writable()?, args)?),
    };

    Ok(CommandOutcome {
        command,
        run_id: run_id.to_string(),
        stages,
    })
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn home_flag_places_database_and_log_inside_it() {
        let cli = Cli::try_parse_from(["cabcarbon", "--home", "/srv/cab", "plot"]).expect("parse");
        let settings = Settings::from_cli(&cli);
        assert_eq!(settings.warehouse.db_path, PathBuf::from("/srv/cab/emissions.duckdb"));
        assert_eq!(settings.log_file, PathBuf::from("/srv/cab/cabcarbon.log"));
    }

    #[test]
    fn explicit_paths_override_home() {
        let cli = Cli::try_parse_from([
            "cabcarbon",
            "--home",
            "/srv/cab",
            "--db-path",
            "/tmp/other.duckdb",
            "--log-file",
            "/var/log/cab.log",
            "plot",
        ])
        .expect("parse");
        let settings = Settings::from_cli(&cli);
        assert_eq!(settings.warehouse.db_path, PathBuf::from("/tmp/other.duckdb"));
        assert_eq!(settings.log_file, PathBuf::from("/var/log/cab.log"));
    }

    #[test]
    fn partial_failure_marks_the_outcome() {
        let mut stage = StageReport::new("clean");
        stage.fleets.push(Fleet::Yellow);
        stage.fail("green: no data in table 'green_tripdata'");
        let outcome = CommandOutcome {
            command: "clean",
            run_id: "test".into(),
            stages: vec![stage.finish(true)],
        };
        assert!(outcome.has_failures());
        assert!(outcome.stages[0].succeeded());
    }
}
