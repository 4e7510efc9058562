use ::duckdb::Connection;

struct Migration {
    version: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_ingest_log",
        sql: r#"
CREATE TABLE IF NOT EXISTS ingest_log (
    run_id TEXT NOT NULL,
    fleet TEXT NOT NULL,
    period TEXT NOT NULL,
    source TEXT NOT NULL,
    status TEXT NOT NULL,
    rows_total BIGINT,
    message TEXT,
    logged_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    },
    Migration {
        version: "0002_clean_log",
        sql: r#"
CREATE TABLE IF NOT EXISTS clean_log (
    run_id TEXT NOT NULL,
    fleet TEXT NOT NULL,
    pre_count BIGINT NOT NULL,
    post_count BIGINT NOT NULL,
    removed_count BIGINT NOT NULL,
    removal_pct DOUBLE NOT NULL,
    logged_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    },
    Migration {
        version: "0003_fleet_state",
        sql: r#"
CREATE TABLE IF NOT EXISTS fleet_state (
    fleet TEXT NOT NULL,
    cleaned BOOLEAN NOT NULL,
    run_id TEXT NOT NULL,
    updated_at TIMESTAMP NOT NULL
);
"#,
    },
];

pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let applied_count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
            [migration.version],
            |row| row.get(0),
        )?;

        if applied_count == 0 {
            connection.execute_batch(migration.sql)?;
            connection.execute(
                "INSERT INTO schema_migrations (version) VALUES (?)",
                [migration.version],
            )?;
        }
    }

    Ok(())
}
