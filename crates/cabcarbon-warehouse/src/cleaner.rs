//! Deduplication and rule-based deletion of invalid trips.
//!
//! The raw table is never edited in place. Rows are copied distinct into a
//! scratch table, invalid rows are deleted there rule by rule, and only a
//! verified scratch table replaces the raw one.

use ::duckdb::ToSql;
use cabcarbon_core::{CleanStats, CleaningRules, Fleet, TripPredicate};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::normalize::NormalizeReport;
use crate::{quote_identifier, set_fleet_cleaned, Warehouse, WarehouseError};

/// Rows one rule deleted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RuleOutcome {
    pub rule: TripPredicate,
    pub removed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanReport {
    pub fleet: Fleet,
    pub normalize: NormalizeReport,
    pub duplicates_removed: u64,
    pub rules: Vec<RuleOutcome>,
    pub stats: CleanStats,
}

impl Warehouse {
    /// Clean the fleet's raw table and put the result in its place.
    ///
    /// A missing or empty raw table fails with [`WarehouseError::NoData`]
    /// before anything is created.
    pub fn clean_fleet(
        &self,
        fleet: Fleet,
        rules: &CleaningRules,
    ) -> Result<CleanReport, WarehouseError> {
        rules.validate()?;

        let raw = fleet.table_name();
        let status = self.table_status(raw)?;
        if !status.is_populated() {
            warn!(fleet = %fleet, table = raw, "no data to clean");
            return Err(WarehouseError::NoData {
                table: raw.to_string(),
            });
        }
        let pre_count = status.row_count();

        let normalize = self.normalize_timestamp_columns(fleet)?;

        let scratch = fleet.clean_table_name();
        let filtered = match self.filter_into(raw, scratch, rules) {
            Ok(filtered) => filtered,
            Err(error) => {
                if let Err(cleanup) = self.drop_table(scratch) {
                    warn!(table = scratch, %cleanup, "failed to drop scratch table");
                }
                return Err(error);
            }
        };
        let (duplicates_removed, outcomes, post_count) = filtered;

        self.in_transaction(|connection| {
            let sql = format!(
                "DROP TABLE {raw_table}; ALTER TABLE {scratch_table} RENAME TO {raw_table};",
                raw_table = quote_identifier(raw),
                scratch_table = quote_identifier(scratch),
            );
            connection.execute_batch(sql.as_str())?;
            set_fleet_cleaned(connection, fleet, true, &self.run_id)
        })?;

        let stats = CleanStats::new(pre_count, post_count);
        if let Err(error) = self.log_clean(fleet, &stats) {
            warn!(fleet = %fleet, %error, "failed to record clean in clean_log");
        }
        info!(
            fleet = %fleet,
            pre_count = stats.pre_count,
            post_count = stats.post_count,
            removed_count = stats.removed_count,
            removal_pct = stats.removal_pct,
            "cleaned fleet table"
        );

        Ok(CleanReport {
            fleet,
            normalize,
            duplicates_removed,
            rules: outcomes,
            stats,
        })
    }

    /// Build the verified scratch table; returns duplicates removed, the
    /// per-rule deletions and the surviving row count.
    fn filter_into(
        &self,
        raw: &str,
        scratch: &str,
        rules: &CleaningRules,
    ) -> Result<(u64, Vec<RuleOutcome>, u64), WarehouseError> {
        let pre_count = self.row_count(raw)?;
        let distinct = self.deduplicate(raw, scratch)?;
        let duplicates_removed = pre_count.saturating_sub(distinct);
        debug!(table = scratch, duplicates_removed, "deduplicated");

        let mut outcomes = Vec::new();
        for rule in rules.predicates() {
            let removed = self.delete_matching(scratch, &rule.violation())?;
            debug!(table = scratch, rule = rule.name(), removed, "applied rule");
            outcomes.push(RuleOutcome { rule, removed });
        }

        for (rule, remaining) in self.count_violations(scratch, rules)? {
            if remaining > 0 {
                return Err(WarehouseError::CleanVerification {
                    table: scratch.to_string(),
                    rule,
                    remaining,
                });
            }
        }

        Ok((duplicates_removed, outcomes, self.row_count(scratch)?))
    }

    /// Copy the distinct rows of `source` into a fresh `target`.
    ///
    /// Returns the number of rows in `target`. Running it again on its own
    /// output keeps every row.
    pub fn deduplicate(&self, source: &str, target: &str) -> Result<u64, WarehouseError> {
        self.drop_table(target)?;
        let sql = format!(
            "CREATE TABLE {} AS SELECT DISTINCT * FROM {}",
            quote_identifier(target),
            quote_identifier(source)
        );
        self.connection().execute_batch(sql.as_str())?;
        self.row_count(target)
    }

    /// Rows of `table` still breaking each rule, in rule order.
    pub fn count_violations(
        &self,
        table: &str,
        rules: &CleaningRules,
    ) -> Result<Vec<(&'static str, u64)>, WarehouseError> {
        rules
            .predicates()
            .iter()
            .map(|rule| Ok((rule.name(), self.count_matching(table, &rule.violation())?)))
            .collect()
    }

    fn log_clean(&self, fleet: Fleet, stats: &CleanStats) -> Result<(), WarehouseError> {
        let pre = i64::try_from(stats.pre_count).unwrap_or(i64::MAX);
        let post = i64::try_from(stats.post_count).unwrap_or(i64::MAX);
        let removed = i64::try_from(stats.removed_count).unwrap_or(i64::MAX);
        let params: [&dyn ToSql; 6] = [
            &self.run_id,
            &fleet.as_str(),
            &pre,
            &post,
            &removed,
            &stats.removal_pct,
        ];
        self.connection().execute(
            "INSERT INTO clean_log \
             (run_id, fleet, pre_count, post_count, removed_count, removal_pct) \
             VALUES (?, ?, ?, ?, ?, ?)",
            params.as_slice(),
        )?;
        Ok(())
    }
}
