pub mod app_state;
pub mod hash_store;
pub mod metadata_cache;
pub mod sqlite;

pub use app_state::RunState;
pub use hash_store::{HashRecord, HashStore, MemoryHashStore, SqliteHashStore};
pub use metadata_cache::{MemoryMetadataCache, MetadataCache, SqliteMetadataCache};
pub use sqlite::Database;
