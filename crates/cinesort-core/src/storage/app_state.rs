use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use tracing::warn;

use super::metadata_cache::CACHE_SCHEMA;
use super::sqlite::{storage_error, Database};
use crate::error::Error;

const LAST_RUN_KEY: &str = "last_run";

/// Small key/value table next to the metadata cache.
pub struct RunState {
    db: Database,
}

impl RunState {
    pub fn open(path: &Path) -> Result<Self, Error> {
        let db = Database::open(path, CACHE_SCHEMA).map_err(storage_error)?;
        Ok(RunState { db })
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        let db = Database::open_in_memory(CACHE_SCHEMA).map_err(storage_error)?;
        Ok(RunState { db })
    }

    /// Start time of the last run that completed without being aborted.
    pub fn last_run(&self) -> Result<Option<DateTime<Utc>>, Error> {
        let value: Option<String> = self
            .db
            .connection()
            .query_row(
                "SELECT value FROM app_state WHERE key = ?1",
                params![LAST_RUN_KEY],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_error)?;
        Ok(value.and_then(|v| match DateTime::parse_from_rfc3339(&v) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(e) => {
                warn!("Ignoring unreadable last run timestamp '{}': {}", v, e);
                None
            }
        }))
    }

    pub fn set_last_run(&self, at: DateTime<Utc>) -> Result<(), Error> {
        self.db
            .connection()
            .execute(
                "INSERT OR REPLACE INTO app_state (key, value) VALUES (?1, ?2)",
                params![LAST_RUN_KEY, at.to_rfc3339()],
            )
            .map_err(storage_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_last_run_round_trip() {
        let state = RunState::open_in_memory().unwrap();
        assert_eq!(state.last_run().unwrap(), None);
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        state.set_last_run(at).unwrap();
        assert_eq!(state.last_run().unwrap(), Some(at));
    }
}
