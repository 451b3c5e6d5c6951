use rusqlite::{Connection, ErrorCode, Result};
use std::path::Path;
use tracing::debug;

use crate::error::Error;

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) a store and apply `schema`, which must be idempotent.
    pub fn open(path: &Path, schema: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.configure_pragmas()?;
        db.conn.execute_batch(schema)?;
        debug!("Opened store {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory(schema: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.configure_pragmas()?;
        db.conn.execute_batch(schema)?;
        Ok(db)
    }

    /// WAL journaling: committed rows survive a crash mid-write, and no
    /// committed row is rewritten in place.
    fn configure_pragmas(&self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Fold the WAL back into the main file.
    pub fn checkpoint(&self) -> Result<()> {
        self.conn
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
    }
}

/// Corruption is reported as such; everything else stays a plain database error.
pub fn storage_error(err: rusqlite::Error) -> Error {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseCorrupt) | Some(ErrorCode::NotADatabase) => {
            Error::StorageCorrupt(err.to_string())
        }
        _ => Error::Database(err),
    }
}
