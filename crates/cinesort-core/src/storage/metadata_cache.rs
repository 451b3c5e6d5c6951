use ahash::AHashMap;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use tracing::{debug, warn};

use super::sqlite::{storage_error, Database};
use crate::error::Error;

pub const CACHE_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS metadata_cache (
    provider    TEXT NOT NULL,
    query       TEXT NOT NULL,
    response    TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    PRIMARY KEY (provider, query)
);
CREATE TABLE IF NOT EXISTS app_state (
    key         TEXT PRIMARY KEY,
    value       TEXT NOT NULL
);";

/// Persistent memo of provider responses, keyed by provider name and a
/// normalised query string. Values are serialized JSON.
///
/// Read failures are treated as misses and write failures are logged. A broken
/// cache never fails a file.
pub trait MetadataCache {
    fn get(&mut self, provider: &str, query: &str) -> Option<String>;
    fn put(&mut self, provider: &str, query: &str, response: &str);
    fn len(&mut self) -> usize;

    /// `false` when the backing store could not be opened.
    fn is_available(&self) -> bool {
        true
    }

    fn is_empty(&mut self) -> bool {
        self.len() == 0
    }
}

/// SQLite backed cache (`cache.db`).
pub struct SqliteMetadataCache {
    db: Option<Database>,
}

impl SqliteMetadataCache {
    /// Opening never fails: an unreadable file yields a disabled cache.
    pub fn open(path: &Path) -> Self {
        match Database::open(path, CACHE_SCHEMA) {
            Ok(db) => SqliteMetadataCache { db: Some(db) },
            Err(e) => {
                warn!(
                    "Metadata cache {} unusable, continuing without it: {}",
                    path.display(),
                    storage_error(e)
                );
                Self::disabled()
            }
        }
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        let db = Database::open_in_memory(CACHE_SCHEMA).map_err(storage_error)?;
        Ok(SqliteMetadataCache { db: Some(db) })
    }

    pub fn disabled() -> Self {
        SqliteMetadataCache { db: None }
    }

    /// Drop every cached response, optionally for one provider only.
    pub fn clear(&mut self, provider: Option<&str>) -> Result<usize, Error> {
        let Some(db) = &self.db else {
            return Ok(0);
        };
        let removed = match provider {
            Some(p) => db
                .connection()
                .execute("DELETE FROM metadata_cache WHERE provider = ?1", params![p]),
            None => db.connection().execute("DELETE FROM metadata_cache", []),
        }
        .map_err(storage_error)?;
        Ok(removed)
    }
}

impl MetadataCache for SqliteMetadataCache {
    fn get(&mut self, provider: &str, query: &str) -> Option<String> {
        let db = self.db.as_ref()?;
        let result = db
            .connection()
            .query_row(
                "SELECT response FROM metadata_cache WHERE provider = ?1 AND query = ?2",
                params![provider, query],
                |row| row.get::<_, String>(0),
            )
            .optional();
        match result {
            Ok(hit) => {
                if hit.is_some() {
                    debug!("Cache hit {}:{}", provider, query);
                }
                hit
            }
            Err(e) => {
                warn!("Cache read failed for {}:{}: {}", provider, query, e);
                None
            }
        }
    }

    fn put(&mut self, provider: &str, query: &str, response: &str) {
        let Some(db) = &self.db else {
            return;
        };
        if let Err(e) = db.connection().execute(
            "INSERT OR REPLACE INTO metadata_cache (provider, query, response, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![provider, query, response, Utc::now().to_rfc3339()],
        ) {
            warn!("Cache write failed for {}:{}: {}", provider, query, e);
        }
    }

    fn len(&mut self) -> usize {
        let Some(db) = &self.db else {
            return 0;
        };
        db.connection()
            .query_row("SELECT COUNT(*) FROM metadata_cache", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as usize)
            .unwrap_or(0)
    }

    fn is_available(&self) -> bool {
        self.db.is_some()
    }
}

/// In-memory cache for tests.
#[derive(Debug, Default)]
pub struct MemoryMetadataCache {
    entries: AHashMap<(String, String), String>,
    pub hits: usize,
    pub misses: usize,
}

impl MemoryMetadataCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataCache for MemoryMetadataCache {
    fn get(&mut self, provider: &str, query: &str) -> Option<String> {
        let hit = self
            .entries
            .get(&(provider.to_string(), query.to_string()))
            .cloned();
        if hit.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        hit
    }

    fn put(&mut self, provider: &str, query: &str, response: &str) {
        self.entries
            .insert((provider.to_string(), query.to_string()), response.to_string());
    }

    fn len(&mut self) -> usize {
        self.entries.len()
    }
}
