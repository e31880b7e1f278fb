use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::CacheError;

/// Durable string key-value storage.
///
/// Writes are synchronous and replace the previous value wholesale.
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;
}

/// Process-local storage, for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let values = self
            .values
            .lock()
            .map_err(|e| CacheError::Storage(e.to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut values = self
            .values
            .lock()
            .map_err(|e| CacheError::Storage(e.to_string()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
