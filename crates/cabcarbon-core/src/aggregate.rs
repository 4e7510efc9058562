//! Grouped emissions totals and extremum selection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{TripRecord, ValidationError};

/// Temporal bucket used to group trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    /// Reported 1..=24 (stored hour + 1).
    HourOfDay,
    /// 0 = Sunday .. 6 = Saturday.
    DayOfWeek,
    /// ISO week, 1..=53.
    WeekOfYear,
    /// 1..=12.
    MonthOfYear,
}

impl GroupKey {
    pub const ALL: [GroupKey; 4] = [
        GroupKey::HourOfDay,
        GroupKey::DayOfWeek,
        GroupKey::WeekOfYear,
        GroupKey::MonthOfYear,
    ];

    /// Stored column in the transformed table.
    pub const fn column(self) -> &'static str {
        match self {
            Self::HourOfDay => "hour_of_day",
            Self::DayOfWeek => "day_of_week",
            Self::WeekOfYear => "week_of_year",
            Self::MonthOfYear => "month_of_year",
        }
    }

    /// Added to the stored value to get the reported key.
    pub const fn offset(self) -> i64 {
        match self {
            Self::HourOfDay => 1,
            Self::DayOfWeek | Self::WeekOfYear | Self::MonthOfYear => 0,
        }
    }

    /// Projection for the reported key.
    pub fn select_expression(self) -> String {
        match self.offset() {
            0 => self.column().to_string(),
            offset => format!("{} + {offset}", self.column()),
        }
    }

    pub const fn noun(self) -> &'static str {
        match self {
            Self::HourOfDay => "hour",
            Self::DayOfWeek => "day",
            Self::WeekOfYear => "week",
            Self::MonthOfYear => "month",
        }
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        match input.trim().to_ascii_lowercase().as_str() {
            "hour" | "hour_of_day" => Ok(Self::HourOfDay),
            "day" | "day_of_week" => Ok(Self::DayOfWeek),
            "week" | "week_of_year" => Ok(Self::WeekOfYear),
            "month" | "month_of_year" => Ok(Self::MonthOfYear),
            _ => Err(ValidationError::InvalidGroupKey {
                value: input.to_owned(),
            }),
        }
    }

    /// Reported key of a trip, derived from its pickup time.
    pub fn key_of(self, trip: &TripRecord) -> Option<i64> {
        let stored = match self {
            Self::HourOfDay => trip.hour_of_day(),
            Self::DayOfWeek => trip.day_of_week(),
            Self::WeekOfYear => trip.week_of_year(),
            Self::MonthOfYear => trip.month_of_year(),
        };
        stored.map(|value| value + self.offset())
    }
}

/// One group of an aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AggregateRow {
    pub key: i64,
    /// Sum of `co2_emissions_kg`, rounded to 2 places.
    pub total_co2_kg: f64,
    pub trip_count: u64,
    /// Mean of `co2_emissions_kg`, rounded to 4 places.
    pub avg_co2_per_trip: f64,
}

/// Ordered aggregation result for one grouping dimension.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateSeries {
    pub group_key: GroupKey,
    pub rows: Vec<AggregateRow>,
}

impl AggregateSeries {
    /// Wrap engine output, enforcing ascending key order.
    pub fn new(group_key: GroupKey, mut rows: Vec<AggregateRow>) -> Self {
        rows.sort_by_key(|row| row.key);
        Self { group_key, rows }
    }

    /// Aggregate `(reported key, co2 kg)` pairs with the engine's rounding.
    pub fn from_observations<I>(group_key: GroupKey, observations: I) -> Self
    where
        I: IntoIterator<Item = (i64, f64)>,
    {
        let mut groups: BTreeMap<i64, (f64, u64)> = BTreeMap::new();
        for (key, co2_kg) in observations {
            let entry = groups.entry(key).or_insert((0.0, 0));
            entry.0 += co2_kg;
            entry.1 += 1;
        }

        let rows = groups
            .into_iter()
            .map(|(key, (sum, count))| AggregateRow {
                key,
                total_co2_kg: round_to(sum, 2),
                trip_count: count,
                avg_co2_per_trip: round_to(sum / count as f64, 4),
            })
            .collect();

        Self { group_key, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Group with the lowest average; ties go to the smallest key.
    pub fn min_group(&self) -> Option<&AggregateRow> {
        self.rows.iter().fold(None, |best, row| match best {
            Some(current) if current.avg_co2_per_trip <= row.avg_co2_per_trip => Some(current),
            _ => Some(row),
        })
    }

    /// Group with the highest average; ties go to the smallest key.
    pub fn max_group(&self) -> Option<&AggregateRow> {
        self.rows.iter().fold(None, |best, row| match best {
            Some(current) if current.avg_co2_per_trip >= row.avg_co2_per_trip => Some(current),
            _ => Some(row),
        })
    }

    pub fn total_co2_kg(&self) -> f64 {
        self.rows.iter().map(|row| row.total_co2_kg).sum()
    }

    pub fn trip_count(&self) -> u64 {
        self.rows.iter().map(|row| row.trip_count).sum()
    }
}

/// Round half away from zero, matching SQL `ROUND(x, places)`.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
