use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

pub const MIN_YEAR: i32 = 2000;
pub const MAX_YEAR: i32 = 2100;

/// One monthly trip file: `(year, month)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    year: i32,
    month: u8,
}

impl Period {
    pub fn new(year: i32, month: u8) -> Result<Self, ValidationError> {
        validate_year(year)?;
        if !(1..=12).contains(&month) {
            return Err(ValidationError::InvalidMonth { month });
        }
        Ok(Self { year, month })
    }

    /// Every month of every year in `start..=end`, in calendar order.
    pub fn range(start_year: i32, end_year: i32) -> Result<Vec<Self>, ValidationError> {
        validate_year(start_year)?;
        validate_year(end_year)?;
        if start_year > end_year {
            return Err(ValidationError::InvertedYearRange {
                start: start_year,
                end: end_year,
            });
        }

        Ok((start_year..=end_year)
            .flat_map(|year| (1..=12).map(move |month| Self { year, month }))
            .collect())
    }

    pub const fn year(self) -> i32 {
        self.year
    }

    pub const fn month(self) -> u8 {
        self.month
    }

    /// `YYYY-MM`, as used in the published file names.
    pub fn label(self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

fn validate_year(year: i32) -> Result<(), ValidationError> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(ValidationError::YearOutOfRange {
            year,
            min: MIN_YEAR,
            max: MAX_YEAR,
        });
    }
    Ok(())
}
