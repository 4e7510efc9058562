//! Scoped `DuckDB` connection.

use std::ops::Deref;
use std::path::{Path, PathBuf};

use ::duckdb::{Config, Connection};
use tracing::debug;

/// Access mode for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Read-only access, for reporting over an existing database file.
    ReadOnly,
    /// Read-write access.
    ReadWrite,
}

/// The single connection a pipeline run works through.
///
/// The connection closes when the session is dropped, on every exit path.
pub struct Session {
    db_path: PathBuf,
    mode: AccessMode,
    connection: Connection,
}

impl Session {
    /// Open a session on the database file at `path`.
    ///
    /// # Errors
    /// Returns an error if the database file cannot be opened or configured.
    pub fn open(path: impl Into<PathBuf>, mode: AccessMode) -> Result<Self, ::duckdb::Error> {
        let db_path = path.into();
        let connection = open_connection(db_path.as_path(), mode)?;
        debug!(path = %db_path.display(), ?mode, "opened duckdb session");
        Ok(Self {
            db_path,
            mode,
            connection,
        })
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        self.db_path.as_path()
    }

    #[must_use]
    pub const fn mode(&self) -> AccessMode {
        self.mode
    }
}

impl Deref for Session {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        &self.connection
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        debug!(path = %self.db_path.display(), "closing duckdb session");
    }
}

fn open_connection(path: &Path, mode: AccessMode) -> Result<Connection, ::duckdb::Error> {
    let connection = match mode {
        AccessMode::ReadWrite => Connection::open(path)?,
        AccessMode::ReadOnly => Connection::open_with_flags(
            path,
            Config::default().access_mode(::duckdb::AccessMode::ReadOnly)?,
        )?,
    };
    configure_connection(&connection)?;
    Ok(connection)
}

fn configure_connection(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch("PRAGMA disable_progress_bar;")
}
