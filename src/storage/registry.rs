//! Numbered databases.
//!
//! The registry owns every [`Database`] of a server together with its sweep
//! tasks. Database 0 exists from the start; any other index below the
//! configured limit is created the first time a session selects it.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::storage::engine::Database;
use crate::storage::expiry::{ExpiryConfig, ExpirySweeper};

struct Slot {
    db: Arc<Database>,
    sweeper: ExpirySweeper,
}

/// Default number of databases (indices `0..16`).
pub const DEFAULT_DATABASES: usize = 16;

/// Lazily populated map from database index to [`Database`].
pub struct DatabaseRegistry {
    shard_count: usize,
    limit: usize,
    expiry: ExpiryConfig,
    slots: RwLock<HashMap<i64, Slot>>,
}

impl std::fmt::Debug for DatabaseRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseRegistry")
            .field("shard_count", &self.shard_count)
            .field("limit", &self.limit)
            .field("databases", &self.slots.read().len())
            .finish()
    }
}

impl DatabaseRegistry {
    /// Creates the registry with database 0. `limit` is the number of valid
    /// indices and is at least one.
    pub fn new(shard_count: usize, limit: usize, expiry: ExpiryConfig) -> Self {
        let registry = Self {
            shard_count,
            limit: limit.max(1),
            expiry,
            slots: RwLock::new(HashMap::new()),
        };
        registry.create(0);
        registry
    }

    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    /// Number of valid database indices.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Database 0, where every session starts.
    pub fn primary(&self) -> Arc<Database> {
        self.create(0)
    }

    /// Returns the database with `index`, if it was ever created.
    pub fn get(&self, index: i64) -> Option<Arc<Database>> {
        self.slots.read().get(&index).map(|slot| Arc::clone(&slot.db))
    }

    /// Returns the database with `index`, creating it and starting its
    /// sweepers on first use. Returns `None` for an index outside
    /// `0..limit`.
    pub fn get_or_create(&self, index: i64) -> Option<Arc<Database>> {
        let in_range = usize::try_from(index).is_ok_and(|i| i < self.limit);
        in_range.then(|| self.create(index))
    }

    fn create(&self, index: i64) -> Arc<Database> {
        if let Some(db) = self.get(index) {
            return db;
        }

        let mut slots = self.slots.write();
        let slot = slots.entry(index).or_insert_with(|| {
            let db = Arc::new(Database::new(index, self.shard_count));
            let sweeper = ExpirySweeper::start(Arc::clone(&db), self.expiry.clone());
            info!(db = index, shards = self.shard_count, "Database created");
            Slot { db, sweeper }
        });
        Arc::clone(&slot.db)
    }

    /// Every database created so far, ordered by index.
    pub fn all(&self) -> Vec<Arc<Database>> {
        let slots = self.slots.read();
        let mut indexes: Vec<i64> = slots.keys().copied().collect();
        indexes.sort_unstable();
        indexes
            .into_iter()
            .filter_map(|index| slots.get(&index).map(|slot| Arc::clone(&slot.db)))
            .collect()
    }

    /// Stops every sweep task. The databases stay readable.
    pub fn stop_sweepers(&self) {
        for slot in self.slots.read().values() {
            slot.sweeper.stop();
        }
    }
}
