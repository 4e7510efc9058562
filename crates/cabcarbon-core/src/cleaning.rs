//! Trip validity rules.
//!
//! Each rule is a [`TripPredicate`] value that can be rendered as a
//! parameterized SQL condition matching the rows that *violate* it, or
//! evaluated directly against a [`TripRecord`]. Both renderings follow SQL
//! comparison semantics: a NULL operand never counts as a violation, except
//! for the explicit timestamp presence rule.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{TripRecord, ValidationError};

/// Canonical pickup column after schema normalization.
pub const PICKUP_COLUMN: &str = "pickup_datetime";
/// Canonical dropoff column after schema normalization.
pub const DROPOFF_COLUMN: &str = "dropoff_datetime";

/// A bound value for a `?` placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum SqlParam {
    Int(i64),
    Float(f64),
}

/// A SQL boolean expression plus the values for its placeholders, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl SqlFragment {
    fn fixed(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }
}

/// One named validity rule over a trip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum TripPredicate {
    /// `passenger_count != 0`
    PassengersPresent,
    /// `trip_distance > 0`
    PositiveDistance,
    /// `trip_distance <= max_miles`
    DistanceAtMost { max_miles: f64 },
    /// Both timestamps are non-null.
    TimestampsPresent,
    /// `pickup < dropoff`
    PickupBeforeDropoff,
    /// `0 < duration <= max_seconds`
    DurationWithin { max_seconds: i64 },
    /// `year(pickup)` in `min_year..=max_year`
    PickupYearWithin { min_year: i32, max_year: i32 },
    /// `total_amount >= 0`
    NonNegativeFare,
}

impl TripPredicate {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PassengersPresent => "passengers_present",
            Self::PositiveDistance => "positive_distance",
            Self::DistanceAtMost { .. } => "distance_at_most",
            Self::TimestampsPresent => "timestamps_present",
            Self::PickupBeforeDropoff => "pickup_before_dropoff",
            Self::DurationWithin { .. } => "duration_within",
            Self::PickupYearWithin { .. } => "pickup_year_within",
            Self::NonNegativeFare => "non_negative_fare",
        }
    }

    /// Condition that is true exactly for the rows breaking this rule.
    pub fn violation(&self) -> SqlFragment {
        match *self {
            Self::PassengersPresent => SqlFragment::fixed("passenger_count = 0"),
            Self::PositiveDistance => SqlFragment::fixed("trip_distance <= 0"),
            Self::DistanceAtMost { max_miles } => SqlFragment {
                sql: String::from("trip_distance > ?"),
                params: vec![SqlParam::Float(max_miles)],
            },
            Self::TimestampsPresent => SqlFragment::fixed(format!(
                "{PICKUP_COLUMN} IS NULL OR {DROPOFF_COLUMN} IS NULL"
            )),
            Self::PickupBeforeDropoff => {
                SqlFragment::fixed(format!("{PICKUP_COLUMN} >= {DROPOFF_COLUMN}"))
            }
            Self::DurationWithin { max_seconds } => SqlFragment {
                sql: format!(
                    "date_diff('second', {PICKUP_COLUMN}, {DROPOFF_COLUMN}) <= 0 \
                     OR date_diff('second', {PICKUP_COLUMN}, {DROPOFF_COLUMN}) > ?"
                ),
                params: vec![SqlParam::Int(max_seconds)],
            },
            Self::PickupYearWithin { min_year, max_year } => SqlFragment {
                sql: format!("EXTRACT(YEAR FROM {PICKUP_COLUMN}) NOT BETWEEN ? AND ?"),
                params: vec![
                    SqlParam::Int(i64::from(min_year)),
                    SqlParam::Int(i64::from(max_year)),
                ],
            },
            Self::NonNegativeFare => SqlFragment::fixed("total_amount < 0"),
        }
    }

    /// In-memory counterpart of [`Self::violation`], negated.
    pub fn accepts(&self, trip: &TripRecord) -> bool {
        match *self {
            Self::PassengersPresent => trip.passenger_count != Some(0),
            Self::PositiveDistance => !matches!(trip.trip_distance, Some(d) if d <= 0.0),
            Self::DistanceAtMost { max_miles } => {
                !matches!(trip.trip_distance, Some(d) if d > max_miles)
            }
            Self::TimestampsPresent => {
                trip.pickup_datetime.is_some() && trip.dropoff_datetime.is_some()
            }
            Self::PickupBeforeDropoff => match (trip.pickup_datetime, trip.dropoff_datetime) {
                (Some(pickup), Some(dropoff)) => pickup < dropoff,
                _ => true,
            },
            Self::DurationWithin { max_seconds } => match trip.duration_seconds() {
                Some(seconds) => seconds > 0 && seconds <= max_seconds,
                None => true,
            },
            Self::PickupYearWithin { min_year, max_year } => match trip.pickup_datetime {
                Some(pickup) => (min_year..=max_year).contains(&pickup.year()),
                None => true,
            },
            Self::NonNegativeFare => !matches!(trip.total_amount, Some(amount) if amount < 0.0),
        }
    }
}

/// Thresholds for the cleaning rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CleaningRules {
    pub max_distance_miles: f64,
    pub max_duration_seconds: i64,
    pub min_pickup_year: i32,
    pub max_pickup_year: i32,
}

impl Default for CleaningRules {
    fn default() -> Self {
        Self {
            max_distance_miles: 100.0,
            max_duration_seconds: 86_400,
            min_pickup_year: 2015,
            max_pickup_year: 2024,
        }
    }
}

impl CleaningRules {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.max_distance_miles.is_finite() || self.max_distance_miles <= 0.0 {
            return Err(ValidationError::NonPositiveThreshold {
                field: "max_distance_miles",
            });
        }
        if self.max_duration_seconds <= 0 {
            return Err(ValidationError::NonPositiveThreshold {
                field: "max_duration_seconds",
            });
        }
        if self.min_pickup_year > self.max_pickup_year {
            return Err(ValidationError::EmptyYearWindow {
                min: self.min_pickup_year,
                max: self.max_pickup_year,
            });
        }
        Ok(())
    }

    /// The row-level rules, in the order the cleaner applies them.
    pub fn predicates(&self) -> Vec<TripPredicate> {
        vec![
            TripPredicate::PassengersPresent,
            TripPredicate::PositiveDistance,
            TripPredicate::DistanceAtMost {
                max_miles: self.max_distance_miles,
            },
            TripPredicate::TimestampsPresent,
            TripPredicate::PickupBeforeDropoff,
            TripPredicate::DurationWithin {
                max_seconds: self.max_duration_seconds,
            },
            TripPredicate::PickupYearWithin {
                min_year: self.min_pickup_year,
                max_year: self.max_pickup_year,
            },
            TripPredicate::NonNegativeFare,
        ]
    }

    pub fn accepts(&self, trip: &TripRecord) -> bool {
        self.predicates().iter().all(|rule| rule.accepts(trip))
    }

    /// Names of every rule the trip breaks.
    pub fn violations(&self, trip: &TripRecord) -> Vec<&'static str> {
        self.predicates()
            .iter()
            .filter(|rule| !rule.accepts(trip))
            .map(TripPredicate::name)
            .collect()
    }

    /// Deduplicate then filter a batch of trips without a database.
    pub fn clean_records(&self, records: &[TripRecord]) -> (Vec<TripRecord>, CleanStats) {
        let mut kept = deduplicate(records);
        kept.retain(|trip| self.accepts(trip));
        let stats = CleanStats::new(records.len() as u64, kept.len() as u64);
        (kept, stats)
    }
}

/// Keep the first instance of every exact full-row duplicate.
pub fn deduplicate(records: &[TripRecord]) -> Vec<TripRecord> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .iter()
        .filter(|trip| seen.insert(row_key(trip)))
        .cloned()
        .collect()
}

type RowKey = (
    Option<i64>,
    Option<time::PrimitiveDateTime>,
    Option<time::PrimitiveDateTime>,
    Option<i64>,
    Option<u64>,
    Option<u64>,
);

fn row_key(trip: &TripRecord) -> RowKey {
    (
        trip.vendor_id,
        trip.pickup_datetime,
        trip.dropoff_datetime,
        trip.passenger_count,
        trip.trip_distance.map(f64::to_bits),
        trip.total_amount.map(f64::to_bits),
    )
}

/// Row counts before and after a clean.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CleanStats {
    pub pre_count: u64,
    pub post_count: u64,
    pub removed_count: u64,
    pub removal_pct: f64,
}

impl CleanStats {
    pub fn new(pre_count: u64, post_count: u64) -> Self {
        let removed_count = pre_count.saturating_sub(post_count);
        let removal_pct = if pre_count == 0 {
            0.0
        } else {
            removed_count as f64 / pre_count as f64 * 100.0
        };
        Self {
            pre_count,
            post_count,
            removed_count,
            removal_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trip(pickup: &str, dropoff: &str, passengers: i64, miles: f64, fare: f64) -> TripRecord {
        TripRecord::new(pickup, dropoff, passengers, miles, fare).expect("trip")
    }

    fn good() -> TripRecord {
        trip("2024-01-01 08:00:00", "2024-01-01 08:20:00", 1, 3.5, 18.0)
    }

    #[test]
    fn default_rules_accept_an_ordinary_trip() {
        assert!(CleaningRules::default().accepts(&good()));
    }

    #[test]
    fn zero_passengers_is_rejected_but_null_passengers_is_kept() {
        let rules = CleaningRules::default();
        let mut zero = good();
        zero.passenger_count = Some(0);
        assert_eq!(rules.violations(&zero), vec!["passengers_present"]);

        let mut unknown = good();
        unknown.passenger_count = None;
        assert!(rules.accepts(&unknown));
    }

    #[test]
    fn distance_bounds_are_exclusive_at_zero_and_inclusive_at_max() {
        let rules = CleaningRules::default();
        assert!(!rules.accepts(&trip("2024-01-01 08:00:00", "2024-01-01 08:20:00", 1, 0.0, 5.0)));
        assert!(rules.accepts(&trip("2024-01-01 08:00:00", "2024-01-01 08:20:00", 1, 100.0, 5.0)));
        assert!(!rules.accepts(&trip("2024-01-01 08:00:00", "2024-01-01 08:20:00", 1, 100.01, 5.0)));
    }

    #[test]
    fn duration_must_be_positive_and_at_most_a_day() {
        let rules = CleaningRules::default();
        let same_instant = trip("2024-01-01 08:00:00", "2024-01-01 08:00:00", 1, 1.0, 5.0);
        assert_eq!(
            rules.violations(&same_instant),
            vec!["pickup_before_dropoff", "duration_within"]
        );

        let exactly_a_day = trip("2024-01-01 08:00:00", "2024-01-02 08:00:00", 1, 1.0, 5.0);
        assert!(rules.accepts(&exactly_a_day));

        let over_a_day = trip("2024-01-01 08:00:00", "2024-01-02 08:00:01", 1, 1.0, 5.0);
        assert_eq!(rules.violations(&over_a_day), vec!["duration_within"]);
    }

    #[test]
    fn missing_timestamp_only_breaks_presence_rule() {
        let mut missing = good();
        missing.dropoff_datetime = None;
        assert_eq!(
            CleaningRules::default().violations(&missing),
            vec!["timestamps_present"]
        );
    }

    #[test]
    fn pickup_year_window_is_inclusive() {
        let rules = CleaningRules::default();
        assert!(rules.accepts(&trip("2015-01-01 00:00:00", "2015-01-01 00:10:00", 1, 1.0, 5.0)));
        assert!(!rules.accepts(&trip("2014-12-31 23:50:00", "2015-01-01 00:10:00", 1, 1.0, 5.0)));
        assert!(!rules.accepts(&trip("2025-01-01 00:00:00", "2025-01-01 00:10:00", 1, 1.0, 5.0)));
    }

    #[test]
    fn negative_fare_is_rejected_zero_fare_is_kept() {
        let rules = CleaningRules::default();
        assert!(rules.accepts(&trip("2024-01-01 08:00:00", "2024-01-01 08:20:00", 1, 1.0, 0.0)));
        assert!(!rules.accepts(&trip("2024-01-01 08:00:00", "2024-01-01 08:20:00", 1, 1.0, -0.5)));
    }

    #[test]
    fn thresholds_are_bound_as_parameters() {
        let rules = CleaningRules {
            max_distance_miles: 50.0,
            max_duration_seconds: 3_600,
            min_pickup_year: 2020,
            max_pickup_year: 2022,
        };
        let fragments: Vec<SqlFragment> =
            rules.predicates().iter().map(TripPredicate::violation).collect();

        assert_eq!(fragments[2].params, vec![SqlParam::Float(50.0)]);
        assert_eq!(fragments[5].params, vec![SqlParam::Int(3_600)]);
        assert_eq!(
            fragments[6].params,
            vec![SqlParam::Int(2020), SqlParam::Int(2022)]
        );
        for fragment in &fragments {
            assert_eq!(fragment.sql.matches('?').count(), fragment.params.len());
        }
    }

    #[test]
    fn validate_rejects_inconsistent_thresholds() {
        let mut rules = CleaningRules::default();
        rules.max_distance_miles = f64::NAN;
        assert!(rules.validate().is_err());

        let mut rules = CleaningRules::default();
        rules.min_pickup_year = 2030;
        assert!(matches!(
            rules.validate(),
            Err(ValidationError::EmptyYearWindow { .. })
        ));
    }

    #[test]
    fn ten_rows_with_two_duplicates_and_one_empty_cab_clean_to_seven() {
        let mut records: Vec<TripRecord> = (0..8)
            .map(|minute| {
                trip(
                    &format!("2024-02-01 10:{minute:02}:00"),
                    &format!("2024-02-01 10:{:02}:00", minute + 30),
                    1,
                    2.0,
                    10.0,
                )
            })
            .collect();
        records[7].passenger_count = Some(0);
        records.push(records[0].clone());
        records.push(records[1].clone());

        let (kept, stats) = CleaningRules::default().clean_records(&records);

        assert_eq!(kept.len(), 7);
        assert_eq!(stats.pre_count, 10);
        assert_eq!(stats.removed_count, 3);
        assert!((stats.removal_pct - 30.0).abs() < 1e-9);
        assert_eq!(stats.removed_count + stats.post_count, stats.pre_count);
    }

    #[test]
    fn deduplication_is_idempotent() {
        let records = vec![good(), good(), good().with_vendor(Some(2))];
        let once = deduplicate(&records);
        let twice = deduplicate(&once);
        assert_eq!(once.len(), 2);
        assert_eq!(once, twice);
    }

    #[test]
    fn removal_percentage_of_empty_input_is_zero() {
        let stats = CleanStats::new(0, 0);
        assert_eq!(stats.removal_pct, 0.0);
        assert_eq!(stats.removed_count, 0);
    }

    #[test]
    fn predicates_serialize_with_their_rule_name() {
        let rules = CleaningRules::default();
        let value = serde_json::to_value(rules.predicates()).expect("json");
        assert_eq!(value[0], serde_json::json!({ "rule": "passengers_present" }));
        assert_eq!(
            value[2],
            serde_json::json!({ "rule": "distance_at_most", "max_miles": 100.0 })
        );
        assert_eq!(
            value[6],
            serde_json::json!({ "rule": "pickup_year_within", "min_year": 2015, "max_year": 2024 })
        );
    }

    #[test]
    fn clean_stats_serialize_as_plain_numbers() {
        let value = serde_json::to_value(CleanStats::new(200, 150)).expect("json");
        assert_eq!(value["pre_count"], 200);
        assert_eq!(value["post_count"], 150);
        assert_eq!(value["removed_count"], 50);
        assert_eq!(value["removal_pct"], 25.0);
    }
}
