//! Renames the fleet-prefixed timestamp columns to their canonical names.

use cabcarbon_core::{Fleet, DROPOFF_COLUMN, PICKUP_COLUMN};
use serde::Serialize;
use tracing::{debug, info};

use crate::{quote_identifier, Warehouse, WarehouseError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ColumnOutcome {
    Renamed { from: String, to: String },
    AlreadyCanonical { column: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizeReport {
    pub fleet: Fleet,
    pub pickup: ColumnOutcome,
    pub dropoff: ColumnOutcome,
}

impl NormalizeReport {
    pub fn renamed_any(&self) -> bool {
        matches!(self.pickup, ColumnOutcome::Renamed { .. })
            || matches!(self.dropoff, ColumnOutcome::Renamed { .. })
    }
}

impl Warehouse {
    /// Rename `tpep_`/`lpep_` timestamp columns of the fleet's raw table.
    ///
    /// Safe to repeat: a column already carrying the canonical name is
    /// reported as such.
    pub fn normalize_timestamp_columns(
        &self,
        fleet: Fleet,
    ) -> Result<NormalizeReport, WarehouseError> {
        let table = fleet.table_name();
        let columns = self.column_names(table)?;
        if columns.is_empty() {
            return Err(WarehouseError::NoData {
                table: table.to_string(),
            });
        }

        let pickup =
            self.normalize_column(table, &columns, fleet.source_pickup_column(), PICKUP_COLUMN)?;
        let dropoff = self.normalize_column(
            table,
            &columns,
            fleet.source_dropoff_column(),
            DROPOFF_COLUMN,
        )?;

        let report = NormalizeReport {
            fleet,
            pickup,
            dropoff,
        };
        info!(fleet = %fleet, renamed = report.renamed_any(), "normalized timestamp columns");
        Ok(report)
    }

    fn normalize_column(
        &self,
        table: &str,
        columns: &[String],
        source: &str,
        canonical: &str,
    ) -> Result<ColumnOutcome, WarehouseError> {
        let has = |name: &str| columns.iter().any(|column| column == name);

        match (has(source), has(canonical)) {
            (true, false) => {
                let sql = format!(
                    "ALTER TABLE {} RENAME COLUMN {} TO {}",
                    quote_identifier(table),
                    quote_identifier(source),
                    quote_identifier(canonical)
                );
                self.connection().execute_batch(sql.as_str())?;
                debug!(table, from = source, to = canonical, "renamed column");
                Ok(ColumnOutcome::Renamed {
                    from: source.to_string(),
                    to: canonical.to_string(),
                })
            }
            (false, true) => Ok(ColumnOutcome::AlreadyCanonical {
                column: canonical.to_string(),
            }),
            (true, true) => Err(WarehouseError::QueryRejected(format!(
                "table '{table}' has both '{source}' and '{canonical}'"
            ))),
            (false, false) => Err(WarehouseError::MissingColumn {
                table: table.to_string(),
                column: canonical.to_string(),
            }),
        }
    }
}
