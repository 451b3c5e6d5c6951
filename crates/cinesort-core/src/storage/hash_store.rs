use ahash::{AHashMap, AHashSet};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::sqlite::{storage_error, Database};
use crate::error::Error;
use crate::model::{Category, ContentHash};

const HASH_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS file_hash (
    hash        TEXT PRIMARY KEY,
    first_seen  TEXT NOT NULL,
    source_path TEXT NOT NULL,
    file_name   TEXT NOT NULL
);";

/// A processed file as remembered by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct HashRecord {
    pub category: Category,
    pub content_hash: ContentHash,
    pub first_seen: String,
    pub source_path: String,
}

/// Per-category memory of already processed content.
pub trait HashStore {
    fn is_known(&mut self, category: Category, hash: &ContentHash) -> Result<bool, Error>;

    /// Idempotent: returns `false` when the hash was already recorded.
    fn record(&mut self, category: Category, hash: &ContentHash, source: &Path)
        -> Result<bool, Error>;

    fn get(&mut self, category: Category, hash: &ContentHash) -> Result<Option<HashRecord>, Error>;

    fn count(&mut self, category: Category) -> Result<usize, Error>;

    /// Called once at the end of a run.
    fn flush(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// One SQLite file per category, opened on first use.
pub struct SqliteHashStore {
    dir: Option<PathBuf>,
    stores: AHashMap<Category, Database>,
}

impl SqliteHashStore {
    pub fn open(dir: &Path) -> Self {
        SqliteHashStore {
            dir: Some(dir.to_path_buf()),
            stores: AHashMap::new(),
        }
    }

    pub fn open_in_memory() -> Self {
        SqliteHashStore {
            dir: None,
            stores: AHashMap::new(),
        }
    }

    pub fn store_path(dir: &Path, category: Category) -> PathBuf {
        dir.join(format!("hashes_{}.db", category.key()))
    }

    fn db(&mut self, category: Category) -> Result<&Database, Error> {
        if !self.stores.contains_key(&category) {
            let db = match &self.dir {
                Some(dir) => Database::open(&Self::store_path(dir, category), HASH_SCHEMA),
                None => Database::open_in_memory(HASH_SCHEMA),
            }
            .map_err(storage_error)?;
            self.stores.insert(category, db);
        }
        self.stores
            .get(&category)
            .ok_or_else(|| Error::Other(format!("Hash store for {} not open", category)))
    }
}

impl HashStore for SqliteHashStore {
    fn is_known(&mut self, category: Category, hash: &ContentHash) -> Result<bool, Error> {
        let db = self.db(category)?;
        let found: Option<i64> = db
            .connection()
            .query_row(
                "SELECT 1 FROM file_hash WHERE hash = ?1",
                params![hash.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_error)?;
        Ok(found.is_some())
    }

    fn record(
        &mut self,
        category: Category,
        hash: &ContentHash,
        source: &Path,
    ) -> Result<bool, Error> {
        let db = self.db(category)?;
        let file_name = source
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let inserted = db
            .connection()
            .execute(
                "INSERT OR IGNORE INTO file_hash (hash, first_seen, source_path, file_name) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    hash.as_str(),
                    Utc::now().to_rfc3339(),
                    source.to_string_lossy(),
                    file_name
                ],
            )
            .map_err(storage_error)?;
        if inserted == 0 {
            debug!("Hash {} already recorded for {}", hash.short(), category);
        }
        Ok(inserted == 1)
    }

    fn get(&mut self, category: Category, hash: &ContentHash) -> Result<Option<HashRecord>, Error> {
        let db = self.db(category)?;
        db.connection()
            .query_row(
                "SELECT hash, first_seen, source_path FROM file_hash WHERE hash = ?1",
                params![hash.as_str()],
                |row| {
                    Ok(HashRecord {
                        category,
                        content_hash: ContentHash::from(row.get::<_, String>(0)?.as_str()),
                        first_seen: row.get(1)?,
                        source_path: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(storage_error)
    }

    fn count(&mut self, category: Category) -> Result<usize, Error> {
        let db = self.db(category)?;
        let count: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM file_hash", [], |row| row.get(0))
            .map_err(storage_error)?;
        Ok(count as usize)
    }

    fn flush(&mut self) -> Result<(), Error> {
        for (category, db) in &self.stores {
            if let Err(e) = db.checkpoint() {
                warn!("Checkpoint of {} hash store failed: {}", category, e);
            }
        }
        Ok(())
    }
}

/// In-memory store for tests and throwaway runs.
#[derive(Debug, Default)]
pub struct MemoryHashStore {
    known: AHashSet<(Category, ContentHash)>,
    pub record_calls: usize,
}

impl MemoryHashStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

impl HashStore for MemoryHashStore {
    fn is_known(&mut self, category: Category, hash: &ContentHash) -> Result<bool, Error> {
        Ok(self.known.contains(&(category, hash.clone())))
    }

    fn record(&mut self, category: Category, hash: &ContentHash, _source: &Path) -> Result<bool, Error> {
        self.record_calls += 1;
        Ok(self.known.insert((category, hash.clone())))
    }

    fn get(&mut self, category: Category, hash: &ContentHash) -> Result<Option<HashRecord>, Error> {
        Ok(self
            .known
            .contains(&(category, hash.clone()))
            .then(|| HashRecord {
                category,
                content_hash: hash.clone(),
                first_seen: String::new(),
                source_path: String::new(),
            }))
    }

    fn count(&mut self, category: Category) -> Result<usize, Error> {
        Ok(self.known.iter().filter(|(c, _)| *c == category).count())
    }
}
