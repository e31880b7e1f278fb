//! Persistent local cache.
//!
//! Whole collections are stored as JSON arrays under one key each. Reads
//! never fail from the caller's point of view: a missing key, a storage error
//! or corrupt JSON all come back as "nothing stored" or an empty collection,
//! with the problem logged.

mod storage;
#[cfg(feature = "sqlite")]
mod sqlite;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use storage::{KeyValueStorage, MemoryStorage};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;

use crate::error::CacheError;

/// Key holding the shelf collection (items nested).
pub const SHELVES_KEY: &str = "warehouse_data";
/// Key holding the note collection.
pub const NOTES_KEY: &str = "warehouse_notes";
/// Set once seed data has been installed.
pub const SEEDED_KEY: &str = "warehouse_initialized";

#[derive(Clone)]
pub struct LocalCache {
    storage: Arc<dyn KeyValueStorage>,
}

impl LocalCache {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    /// Cache over fresh in-memory storage.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// The stored collection, or `None` when the key was never written.
    ///
    /// Corrupt content yields `Some(vec![])`: the key exists, its data is lost.
    pub fn stored<T: DeserializeOwned>(&self, key: &str) -> Option<Vec<T>> {
        let raw = match self.storage.get(key) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::error!(key, error = %e, "Error reading local cache");
                return Some(Vec::new());
            }
        };
        match parse_collection(key, &raw) {
            Ok(entries) => Some(entries),
            Err(e) => {
                tracing::error!(key, error = %e, "Error loading data");
                Some(Vec::new())
            }
        }
    }

    /// The stored collection, empty when absent or unreadable.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        self.stored(key).unwrap_or_default()
    }

    /// Overwrite the collection under `key`. Failures are logged.
    pub fn save<T: Serialize>(&self, key: &str, entries: &[T]) {
        if let Err(e) = self.try_save(key, entries) {
            tracing::error!(key, error = %e, "Error saving local cache");
        }
    }

    pub fn try_save<T: Serialize>(&self, key: &str, entries: &[T]) -> Result<(), CacheError> {
        let json = serde_json::to_string(entries).map_err(|e| CacheError::Parse {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.storage.set(key, &json)
    }

    /// Store a raw JSON value under `key` as-is.
    pub fn write_raw(&self, key: &str, json: &str) -> Result<(), CacheError> {
        self.storage.set(key, json)
    }

    pub fn is_seeded(&self) -> bool {
        match self.storage.get(SEEDED_KEY) {
            Ok(value) => value.is_some(),
            Err(e) => {
                tracing::error!(error = %e, "Error reading seed marker");
                // Unknown counts as seeded.
                true
            }
        }
    }

    pub fn mark_seeded(&self) {
        if let Err(e) = self.storage.set(SEEDED_KEY, "true") {
            tracing::error!(error = %e, "Error writing seed marker");
        }
    }
}

fn parse_collection<T: DeserializeOwned>(key: &str, raw: &str) -> Result<Vec<T>, CacheError> {
    serde_json::from_str(raw).map_err(|e| CacheError::Parse {
        key: key.to_string(),
        message: e.to_string(),
    })
}
