use thiserror::Error;

/// Validation failures for domain values and pipeline settings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("invalid fleet '{value}', expected one of yellow, green")]
    InvalidFleet { value: String },

    #[error("month {month} is outside 1..=12")]
    InvalidMonth { month: u8 },
    #[error("year {year} is outside {min}..={max}")]
    YearOutOfRange { year: i32, min: i32, max: i32 },
    #[error("start year {start} is after end year {end}")]
    InvertedYearRange { start: i32, end: i32 },

    #[error("threshold '{field}' must be finite and greater than zero")]
    NonPositiveThreshold { field: &'static str },
    #[error("pickup year window {min}..={max} is empty")]
    EmptyYearWindow { min: i32, max: i32 },

    #[error("timestamp '{value}' is not in 'YYYY-MM-DD HH:MM:SS' form")]
    InvalidTimestamp { value: String },

    #[error("invalid group key '{value}', expected one of hour, day, week, month")]
    InvalidGroupKey { value: String },
}
