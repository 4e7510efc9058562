//! Behaviour of grouped CO₂ aggregation and its reporting.

use std::time::Duration;

use cabcarbon_core::report::{extremum_lines, series_lines};
use cabcarbon_core::{AggregateSeries, CleaningRules, Fleet, GroupKey, TripRecord};
use cabcarbon_tests::{
    mixed_month, open_warehouse, tempdir, trip, write_emissions_csv, write_month,
};
use cabcarbon_warehouse::{period_sources, Warehouse};
use tempfile::TempDir;

const YELLOW_GRAMS_PER_MILE: f64 = 250.0;

/// Load, clean and transform the given yellow months.
fn transformed_yellow(months: &[(&str, Vec<TripRecord>)]) -> (TempDir, Warehouse) {
    let (home, warehouse) = open_warehouse();
    let files = tempdir().expect("tempdir");
    for (label, rows) in months {
        write_month(files.path(), Fleet::Yellow, label, rows);
    }

    let base = files.path().to_string_lossy().into_owned();
    let sources = period_sources(&base, Fleet::Yellow, 2024, 2024).expect("sources");
    warehouse
        .load_fleet(Fleet::Yellow, &sources, Duration::ZERO)
        .expect("load");
    warehouse
        .load_emissions_factors(&write_emissions_csv(files.path()))
        .expect("factors");
    warehouse
        .clean_fleet(Fleet::Yellow, &CleaningRules::default())
        .expect("clean");
    warehouse.build_transformed(&[Fleet::Yellow]).expect("transform");
    (home, warehouse)
}

fn morning_trips() -> Vec<TripRecord> {
    vec![
        trip("2024-01-05 08:00:00", "2024-01-05 08:20:00", 1, 4.0, 20.0),
        trip("2024-01-05 09:10:00", "2024-01-05 09:40:00", 2, 8.0, 35.0),
        trip("2024-01-08 08:30:00", "2024-01-08 08:50:00", 1, 2.0, 12.0),
    ]
}

// =============================================================================
// Aggregation: Engine results
// =============================================================================

#[test]
fn when_trips_are_grouped_by_hour_keys_are_reported_one_based() {
    // Given: Two trips starting at 08:xx and one at 09:xx
    let (_home, warehouse) = transformed_yellow(&[("2024-01", morning_trips())]);

    // When: They are aggregated by hour
    let series = warehouse
        .aggregate(Fleet::Yellow, GroupKey::HourOfDay)
        .expect("aggregate");

    // Then: Hour 8 is reported as 9 and hour 9 as 10
    let rows: Vec<(i64, f64, u64, f64)> = series
        .rows
        .iter()
        .map(|row| (row.key, row.total_co2_kg, row.trip_count, row.avg_co2_per_trip))
        .collect();
    assert_eq!(rows, vec![(9, 1.5, 2, 0.75), (10, 2.0, 1, 2.0)]);
}

#[test]
fn when_a_month_is_aggregated_every_dimension_matches_the_trips_in_memory() {
    // Given: A cleaned and transformed month of mixed trips
    let rows = mixed_month(2024, 5, 150);
    let (_home, warehouse) = transformed_yellow(&[("2024-05", rows.clone())]);
    let (kept, _) = CleaningRules::default().clean_records(&rows);

    for key in GroupKey::ALL {
        // When: The engine aggregates by this key
        let engine = warehouse.aggregate(Fleet::Yellow, key).expect("aggregate");

        // Then: Groups and counts match the in-memory aggregation
        let expected = AggregateSeries::from_observations(
            key,
            kept.iter().filter_map(|trip| {
                let co2 = trip.trip_distance? * YELLOW_GRAMS_PER_MILE / 1000.0;
                Some((key.key_of(trip)?, co2))
            }),
        );
        assert_eq!(engine.rows.len(), expected.rows.len(), "{key:?}");
        for (got, want) in engine.rows.iter().zip(&expected.rows) {
            assert_eq!(got.key, want.key);
            assert_eq!(got.trip_count, want.trip_count);
            assert!((got.total_co2_kg - want.total_co2_kg).abs() < 0.011);
            assert!((got.avg_co2_per_trip - want.avg_co2_per_trip).abs() < 0.0002);
        }

        // And: Every dimension accounts for all trips
        assert_eq!(engine.trip_count(), kept.len() as u64);
    }
}

#[test]
fn when_two_trips_tie_for_largest_the_earlier_pickup_wins() {
    // Given: Two equally long trips
    let (_home, warehouse) = transformed_yellow(&[(
        "2024-01",
        vec![
            trip("2024-01-20 14:00:00", "2024-01-20 15:00:00", 1, 40.0, 150.0),
            trip("2024-01-02 07:00:00", "2024-01-02 08:00:00", 1, 40.0, 140.0),
            trip("2024-01-10 12:00:00", "2024-01-10 12:10:00", 1, 1.0, 9.0),
        ],
    )]);

    // When: The largest trip is asked for
    let largest = warehouse
        .largest_trip(Fleet::Yellow)
        .expect("query")
        .expect("a trip");

    // Then: The January 2nd trip is returned
    assert_eq!(largest.co2_emissions_kg, 10.0);
    assert_eq!(largest.pickup_datetime.as_deref(), Some("2024-01-02 07:00:00"));
    assert_eq!(largest.total_amount, Some(140.0));
}

#[test]
fn when_months_have_no_trips_their_totals_are_zero() {
    // Given: Trips in January and March only
    let (_home, warehouse) = transformed_yellow(&[
        ("2024-01", morning_trips()),
        (
            "2024-03",
            vec![trip("2024-03-03 11:00:00", "2024-03-03 11:30:00", 1, 12.0, 40.0)],
        ),
    ]);

    // When: Monthly totals are read
    let totals = warehouse.monthly_totals_tons(Fleet::Yellow).expect("totals");

    // Then: January and March carry tons, every other month is zero
    assert!((totals[0] - 0.0035).abs() < 1e-12);
    assert!((totals[2] - 0.003).abs() < 1e-12);
    for (index, tons) in totals.iter().enumerate() {
        if index != 0 && index != 2 {
            assert_eq!(*tons, 0.0, "month {}", index + 1);
        }
    }
}

// =============================================================================
// Aggregation: Reporting
// =============================================================================

#[test]
fn when_an_hourly_series_is_reported_the_extremes_and_spread_are_named() {
    // Given: The morning series
    let (_home, warehouse) = transformed_yellow(&[("2024-01", morning_trips())]);
    let series = warehouse
        .aggregate(Fleet::Yellow, GroupKey::HourOfDay)
        .expect("aggregate");

    // When: It is rendered
    let groups = series_lines(&series);
    let extremes = extremum_lines(&series);

    // Then: One line per hour and the heaviest hour first
    assert_eq!(groups.len(), 2);
    assert!(groups[0].contains("09:00"));
    assert_eq!(
        extremes,
        vec![
            "Most carbon-heavy hour: 10:00 with avg 2.0000 kg CO2",
            "Least carbon-heavy hour: 09:00 with avg 0.7500 kg CO2",
            "Heaviest hour averages +166.7% over the lightest",
        ]
    );
}
