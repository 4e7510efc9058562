//! # cabcarbon core
//!
//! Storage-independent domain types for the taxi emissions pipeline.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`domain`] | Fleets, load periods and trip records |
//! | [`cleaning`] | Validity rules, thresholds and clean statistics |
//! | [`aggregate`] | Grouping keys, aggregate series and extremum selection |
//! | [`report`] | Text formatting of clean and aggregate results |
//! | [`error`] | Validation errors |
//!
//! ## Quick Start
//!
//! ```rust
//! use cabcarbon_core::{CleaningRules, TripRecord};
//!
//! let rules = CleaningRules::default();
//! let trip = TripRecord::new("2024-01-01 08:00:00", "2024-01-01 08:20:00", 1, 3.5, 18.0)?;
//! assert!(rules.accepts(&trip));
//! # Ok::<(), cabcarbon_core::ValidationError>(())
//! ```

pub mod aggregate;
pub mod cleaning;
pub mod domain;
pub mod error;
pub mod report;

pub use aggregate::{round_to, AggregateRow, AggregateSeries, GroupKey};
pub use cleaning::{
    deduplicate, CleanStats, CleaningRules, SqlFragment, SqlParam, TripPredicate, DROPOFF_COLUMN,
    PICKUP_COLUMN,
};
pub use domain::{format_timestamp, parse_timestamp, Fleet, Period, TripRecord};
pub use error::ValidationError;
