use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::PrimitiveDateTime;

use crate::ValidationError;

const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// One taxi ride with the columns the pipeline keeps from the published files.
///
/// Every column except the timestamps may be NULL in the source data, so
/// they are modelled as options.
#[derive(Debug, Clone, PartialEq)]
pub struct TripRecord {
    pub vendor_id: Option<i64>,
    pub pickup_datetime: Option<PrimitiveDateTime>,
    pub dropoff_datetime: Option<PrimitiveDateTime>,
    pub passenger_count: Option<i64>,
    pub trip_distance: Option<f64>,
    pub total_amount: Option<f64>,
}

impl TripRecord {
    /// Build a fully populated record from `YYYY-MM-DD HH:MM:SS` timestamps.
    pub fn new(
        pickup: &str,
        dropoff: &str,
        passenger_count: i64,
        trip_distance: f64,
        total_amount: f64,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            vendor_id: Some(1),
            pickup_datetime: Some(parse_timestamp(pickup)?),
            dropoff_datetime: Some(parse_timestamp(dropoff)?),
            passenger_count: Some(passenger_count),
            trip_distance: Some(trip_distance),
            total_amount: Some(total_amount),
        })
    }

    pub fn with_vendor(mut self, vendor_id: Option<i64>) -> Self {
        self.vendor_id = vendor_id;
        self
    }

    /// Whole seconds between pickup and dropoff, if both are present.
    pub fn duration_seconds(&self) -> Option<i64> {
        match (self.pickup_datetime, self.dropoff_datetime) {
            (Some(pickup), Some(dropoff)) => Some((dropoff - pickup).whole_seconds()),
            _ => None,
        }
    }

    pub fn hour_of_day(&self) -> Option<i64> {
        self.pickup_datetime.map(|ts| i64::from(ts.hour()))
    }

    /// 0 = Sunday .. 6 = Saturday.
    pub fn day_of_week(&self) -> Option<i64> {
        self.pickup_datetime
            .map(|ts| i64::from(ts.weekday().number_days_from_sunday()))
    }

    /// ISO-8601 week number.
    pub fn week_of_year(&self) -> Option<i64> {
        self.pickup_datetime.map(|ts| i64::from(ts.iso_week()))
    }

    pub fn month_of_year(&self) -> Option<i64> {
        self.pickup_datetime.map(|ts| i64::from(u8::from(ts.month())))
    }
}

/// Parse a `YYYY-MM-DD HH:MM:SS` timestamp.
pub fn parse_timestamp(value: &str) -> Result<PrimitiveDateTime, ValidationError> {
    PrimitiveDateTime::parse(value.trim(), TIMESTAMP_FORMAT).map_err(|_| {
        ValidationError::InvalidTimestamp {
            value: value.to_owned(),
        }
    })
}

/// Render a timestamp the way DuckDB accepts it in `CAST(? AS TIMESTAMP)`.
pub fn format_timestamp(value: PrimitiveDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        value.year(),
        u8::from(value.month()),
        value.day(),
        value.hour(),
        value.minute(),
        value.second()
    )
}
