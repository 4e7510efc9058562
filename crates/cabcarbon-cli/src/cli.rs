//! CLI argument definitions for cabcarbon.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `load` | Load monthly trip files and the emissions factors |
//! | `clean` | Normalize and clean the fleet tables |
//! | `transform` | Estimate CO₂ per trip into `all_data_transformed` |
//! | `analyze` | Report largest trips and hour/day/week/month patterns |
//! | `plot` | Render the monthly CO₂ line chart |
//! | `run` | Every stage above, in order |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--home` | `$CABCARBON_HOME` or `~/.cabcarbon` | Data directory |
//! | `--db-path` | `<home>/emissions.duckdb` | DuckDB database file |
//! | `--log-file` | `<home>/cabcarbon.log` | Append-only process log |
//! | `--format` | `text` | Output format (text, json) |
//!
//! # Examples
//!
//! ```bash
//! # Whole pipeline for 2024 with the default thresholds
//! cabcarbon run --start-year 2024 --end-year 2024
//!
//! # Re-clean the green fleet with a tighter distance cutoff
//! cabcarbon clean --fleet green --max-distance-miles 50
//!
//! # Hourly and monthly patterns as JSON
//! cabcarbon --format json analyze --group-by hour --group-by month
//! ```

use std::path::PathBuf;

use cabcarbon_core::{CleaningRules, Fleet, GroupKey};
use cabcarbon_warehouse::DEFAULT_BASE_URL;
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Estimate and report CO₂ emissions of NYC taxi trips.
#[derive(Debug, Parser)]
#[command(
    name = "cabcarbon",
    author,
    version,
    about = "Estimate CO2 emissions of NYC yellow and green taxi trips",
    long_about = "cabcarbon loads the published NYC taxi trip files into a local DuckDB \
database, cleans them, estimates CO2 per trip from per-mile emissions factors, \
and reports hourly, daily, weekly and monthly patterns.\n\
\n\
Use 'cabcarbon <command> --help' for command-specific help."
)]
pub struct Cli {
    /// Data directory for the database and log file; defaults to
    /// `$CABCARBON_HOME`, then `~/.cabcarbon`.
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// DuckDB database file; defaults to `<home>/emissions.duckdb`.
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    /// Process log file; defaults to `<home>/cabcarbon.log`.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable report lines.
    Text,
    /// One JSON document with every stage result.
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load monthly trip files and the emissions reference table.
    ///
    /// Tables are dropped and recreated. Unreadable months are skipped.
    Load(LoadArgs),

    /// Deduplicate and filter the fleet tables in place.
    Clean(CleanArgs),

    /// Build `all_data_transformed` with CO₂ estimates.
    Transform(FleetArgs),

    /// Report largest trips and grouped CO₂ patterns.
    Analyze(AnalyzeArgs),

    /// Render monthly CO₂ totals per fleet as an SVG line chart.
    Plot(PlotArgs),

    /// Run load, clean, transform, analyze and plot in order.
    Run(RunArgs),
}

/// Fleet selection shared by every stage.
#[derive(Debug, Clone, Args)]
pub struct FleetArgs {
    /// Fleet to process; repeat for several. Defaults to every fleet.
    #[arg(long = "fleet", value_parser = Fleet::parse)]
    pub fleets: Vec<Fleet>,
}

impl FleetArgs {
    /// Selected fleets in processing order, without repeats.
    pub fn selected(&self) -> Vec<Fleet> {
        if self.fleets.is_empty() {
            return Fleet::ALL.to_vec();
        }
        Fleet::ALL
            .into_iter()
            .filter(|fleet| self.fleets.contains(fleet))
            .collect()
    }
}

#[derive(Debug, Clone, Args)]
pub struct LoadArgs {
    #[command(flatten)]
    pub fleets: FleetArgs,

    /// First year to load.
    #[arg(long, default_value_t = 2024)]
    pub start_year: i32,

    /// Last year to load (inclusive).
    #[arg(long, default_value_t = 2024)]
    pub end_year: i32,

    /// Base URL or local directory holding `<fleet>_tripdata_YYYY-MM.parquet`.
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Pause between successive file fetches, in seconds.
    #[arg(long, default_value_t = 60)]
    pub fetch_delay_secs: u64,

    /// CSV with `vehicle_type` and `co2_grams_per_mile` columns.
    #[arg(long, default_value = "data/vehicle_emissions.csv")]
    pub emissions_csv: PathBuf,
}

/// Cleaning thresholds.
#[derive(Debug, Clone, Args)]
pub struct ThresholdArgs {
    /// Longest accepted trip, in miles.
    #[arg(long, default_value_t = 100.0)]
    pub max_distance_miles: f64,

    /// Longest accepted trip, in seconds.
    #[arg(long, default_value_t = 86_400)]
    pub max_duration_seconds: i64,

    /// Earliest accepted pickup year.
    #[arg(long, default_value_t = 2015)]
    pub min_pickup_year: i32,

    /// Latest accepted pickup year.
    #[arg(long, default_value_t = 2024)]
    pub max_pickup_year: i32,
}

impl ThresholdArgs {
    pub fn rules(&self) -> CleaningRules {
        CleaningRules {
            max_distance_miles: self.max_distance_miles,
            max_duration_seconds: self.max_duration_seconds,
            min_pickup_year: self.min_pickup_year,
            max_pickup_year: self.max_pickup_year,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct CleanArgs {
    #[command(flatten)]
    pub fleets: FleetArgs,

    #[command(flatten)]
    pub thresholds: ThresholdArgs,
}

#[derive(Debug, Clone, Args)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub fleets: FleetArgs,

    /// Grouping dimension (hour, day, week, month); repeat for several.
    /// Defaults to all four.
    #[arg(long = "group-by", value_parser = GroupKey::parse)]
    pub group_by: Vec<GroupKey>,
}

impl AnalyzeArgs {
    pub fn group_keys(&self) -> Vec<GroupKey> {
        if self.group_by.is_empty() {
            return GroupKey::ALL.to_vec();
        }
        GroupKey::ALL
            .into_iter()
            .filter(|key| self.group_by.contains(key))
            .collect()
    }
}

#[derive(Debug, Clone, Args)]
pub struct PlotArgs {
    /// SVG file to write.
    #[arg(long, default_value = "monthly_co2_yellow_green.svg")]
    pub output: PathBuf,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub load: LoadArgs,

    #[command(flatten)]
    pub thresholds: ThresholdArgs,

    /// SVG file to write.
    #[arg(long, default_value = "monthly_co2_yellow_green.svg")]
    pub output: PathBuf,
}
