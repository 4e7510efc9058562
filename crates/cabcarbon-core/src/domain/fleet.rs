use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Taxi operator category. Each fleet publishes its own trip files with
/// its own timestamp column prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fleet {
    Yellow,
    Green,
}

impl Fleet {
    /// Processing order used by every stage.
    pub const ALL: [Fleet; 2] = [Fleet::Yellow, Fleet::Green];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yellow => "yellow",
            Self::Green => "green",
        }
    }

    /// Name of the fleet's trip table in the warehouse.
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::Yellow => "yellow_tripdata",
            Self::Green => "green_tripdata",
        }
    }

    /// Scratch table the cleaner builds before renaming it over [`Self::table_name`].
    pub const fn clean_table_name(self) -> &'static str {
        match self {
            Self::Yellow => "yellow_tripdata_clean",
            Self::Green => "green_tripdata_clean",
        }
    }

    /// Pickup timestamp column as published by the fleet.
    pub const fn source_pickup_column(self) -> &'static str {
        match self {
            Self::Yellow => "tpep_pickup_datetime",
            Self::Green => "lpep_pickup_datetime",
        }
    }

    /// Dropoff timestamp column as published by the fleet.
    pub const fn source_dropoff_column(self) -> &'static str {
        match self {
            Self::Yellow => "tpep_dropoff_datetime",
            Self::Green => "lpep_dropoff_datetime",
        }
    }

    /// Key into the emissions reference table.
    pub const fn vehicle_class(self) -> &'static str {
        match self {
            Self::Yellow => "yellow_taxi",
            Self::Green => "green_taxi",
        }
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        match input.trim().to_ascii_lowercase().as_str() {
            "yellow" => Ok(Self::Yellow),
            "green" => Ok(Self::Green),
            _ => Err(ValidationError::InvalidFleet {
                value: input.to_owned(),
            }),
        }
    }
}

impl Display for Fleet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Fleet {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(Fleet::parse(" Yellow ").expect("fleet"), Fleet::Yellow);
        assert_eq!("GREEN".parse::<Fleet>().expect("fleet"), Fleet::Green);
    }

    #[test]
    fn rejects_unknown_fleet() {
        let err = Fleet::parse("fhv").expect_err("must fail");
        assert!(matches!(err, ValidationError::InvalidFleet { .. }));
    }

    #[test]
    fn source_columns_carry_fleet_prefix() {
        assert_eq!(Fleet::Yellow.source_pickup_column(), "tpep_pickup_datetime");
        assert_eq!(Fleet::Green.source_dropoff_column(), "lpep_dropoff_datetime");
    }
}
