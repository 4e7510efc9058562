//! Human-readable rendering of cleaning and aggregation results.
//!
//! Everything here is presentation only: unit conversion, number formatting
//! and calendar names over values computed elsewhere.

use crate::{AggregateRow, AggregateSeries, CleanStats, Fleet, GroupKey};

pub const DAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

pub const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

pub fn kg_to_metric_tons(kg: f64) -> f64 {
    kg / 1000.0
}

/// `1234567` -> `1,234,567`.
pub fn format_thousands(value: u64) -> String {
    group_digits(&value.to_string())
}

/// Fixed-point with thousands separators: `(1234.56, 1)` -> `1,234.6`.
pub fn format_decimal(value: f64, decimals: usize) -> String {
    let rendered = format!("{:.*}", decimals, value.abs());
    let (integer, fraction) = match rendered.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (rendered.as_str(), None),
    };

    let mut out = String::new();
    if value.is_sign_negative() && rendered.chars().any(|ch| ch.is_ascii_digit() && ch != '0') {
        out.push('-');
    }
    out.push_str(&group_digits(integer));
    if let Some(fraction) = fraction {
        out.push('.');
        out.push_str(fraction);
    }
    out
}

fn group_digits(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Relative change from `from` to `to`, in percent.
pub fn percent_delta(from: f64, to: f64) -> Option<f64> {
    if from == 0.0 {
        return None;
    }
    Some((to - from) / from * 100.0)
}

/// Display label of a reported group key.
pub fn group_label(group_key: GroupKey, key: i64) -> String {
    match group_key {
        GroupKey::HourOfDay => format!("{key:02}:00"),
        GroupKey::DayOfWeek => usize::try_from(key)
            .ok()
            .and_then(|index| DAY_NAMES.get(index))
            .map_or_else(|| format!("Day {key}"), |name| (*name).to_string()),
        GroupKey::WeekOfYear => format!("Week {key:02}"),
        GroupKey::MonthOfYear => usize::try_from(key - 1)
            .ok()
            .and_then(|index| MONTH_NAMES.get(index))
            .map_or_else(|| format!("Month {key}"), |name| (*name).to_string()),
    }
}

/// Heading of one grouping dimension's section.
pub fn section_title(group_key: GroupKey) -> &'static str {
    match group_key {
        GroupKey::HourOfDay => "Hourly CO2 patterns (hours 1-24 by cab type)",
        GroupKey::DayOfWeek => "Daily CO2 patterns (Sunday-Saturday by cab type)",
        GroupKey::WeekOfYear => "Weekly CO2 patterns (weeks 1-53 by cab type)",
        GroupKey::MonthOfYear => "Monthly CO2 patterns (Jan-Dec by cab type)",
    }
}

/// `yellow` -> `Yellow`.
pub fn fleet_title(fleet: Fleet) -> String {
    let name = fleet.as_str();
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

pub fn fleet_header(fleet: Fleet) -> String {
    format!("--- {} Taxi ---", fleet.as_str().to_ascii_uppercase())
}

/// One line per group: trips and metric tons.
pub fn series_lines(series: &AggregateSeries) -> Vec<String> {
    series
        .rows
        .iter()
        .map(|row| group_line(series.group_key, row))
        .collect()
}

fn group_line(group_key: GroupKey, row: &AggregateRow) -> String {
    format!(
        "   {}: {:>12} trips, {:>10} metric tons",
        group_label(group_key, row.key),
        format_thousands(row.trip_count),
        format_decimal(kg_to_metric_tons(row.total_co2_kg), 1)
    )
}

/// Most/least carbon-heavy lines plus the spread between them.
pub fn extremum_lines(series: &AggregateSeries) -> Vec<String> {
    let noun = series.group_key.noun();
    let (Some(max), Some(min)) = (series.max_group(), series.min_group()) else {
        return vec![format!("No trips to rank by {noun}")];
    };

    let mut lines = vec![
        format!(
            "Most carbon-heavy {noun}: {} with avg {:.4} kg CO2",
            group_label(series.group_key, max.key),
            max.avg_co2_per_trip
        ),
        format!(
            "Least carbon-heavy {noun}: {} with avg {:.4} kg CO2",
            group_label(series.group_key, min.key),
            min.avg_co2_per_trip
        ),
    ];
    if let Some(spread) = percent_delta(min.avg_co2_per_trip, max.avg_co2_per_trip) {
        lines.push(format!(
            "Heaviest {noun} averages {spread:+.1}% over the lightest"
        ));
    }
    lines
}

/// `Yellow cleaned: 1,000 → 900 (removed 100, 10.0%)`
pub fn clean_summary(fleet: Fleet, stats: &CleanStats) -> String {
    format!(
        "{} cleaned: {} → {} (removed {}, {:.1}%)",
        fleet_title(fleet),
        format_thousands(stats.pre_count),
        format_thousands(stats.post_count),
        format_thousands(stats.removed_count),
        stats.removal_pct
    )
}
