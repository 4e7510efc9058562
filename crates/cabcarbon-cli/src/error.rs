use cabcarbon_warehouse::WarehouseError;
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] cabcarbon_core::ValidationError),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error("chart rendering failed: {0}")]
    Chart(String),

    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Warehouse(WarehouseError::Validation(_)) => 2,
            Self::Warehouse(_) => 3,
            Self::Serialization(_) => 4,
            Self::Chart(_) => 5,
            Self::Logging(_) => 10,
            Self::Io(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cabcarbon_core::ValidationError;

    #[test]
    fn validation_failures_exit_with_two_wherever_they_arise() {
        let direct = CliError::from(ValidationError::InvalidMonth { month: 13 });
        let wrapped = CliError::from(WarehouseError::Validation(ValidationError::InvalidMonth {
            month: 13,
        }));
        assert_eq!(direct.exit_code(), 2);
        assert_eq!(wrapped.exit_code(), 2);
    }

    #[test]
    fn warehouse_failures_exit_with_three() {
        let error = CliError::from(WarehouseError::NoData {
            table: "yellow_tripdata".into(),
        });
        assert_eq!(error.exit_code(), 3);
        assert_eq!(error.to_string(), "no data in table 'yellow_tripdata'");
    }
}
