//! In-memory stores for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use coursesync_common::{Error, Result};

use crate::store::{KeyValueStore, PreferenceStore};

/// In-memory preference and key/value store.
///
/// Useful for testing and development. All data is stored in memory
/// and lost on drop. Preferences and key/values live in separate maps,
/// matching the SQLite layout.
#[derive(Default)]
pub struct MemoryStore {
    preferences: Arc<RwLock<HashMap<String, String>>>,
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of key/value entries (preferences excluded).
    pub fn value_count(&self) -> usize {
        self.values.read().map(|v| v.len()).unwrap_or(0)
    }

    fn poisoned() -> Error {
        Error::Storage("memory store lock poisoned".to_string())
    }
}

#[async_trait]
impl PreferenceStore for MemoryStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        let preferences = self.preferences.read().map_err(|_| Self::poisoned())?;
        Ok(preferences.get(key).cloned())
    }

    async fn put_string(&self, key: &str, value: &str) -> Result<()> {
        self.preferences
            .write()
            .map_err(|_| Self::poisoned())?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.read().map_err(|_| Self::poisoned())?;
        Ok(values.get(key).cloned())
    }

    async fn set_value(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .map_err(|_| Self::poisoned())?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_value(&self, key: &str) -> Result<()> {
        self.values
            .write()
            .map_err(|_| Self::poisoned())?
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_preferences_and_values_are_separate() {
        let store = MemoryStore::new();
        store.put_string("k", "pref").await.unwrap();
        store.set_value("k", "value").await.unwrap();

        assert_eq!(store.get_string("k").await.unwrap().as_deref(), Some("pref"));
        assert_eq!(store.get_value("k").await.unwrap().as_deref(), Some("value"));
        assert_eq!(store.value_count(), 1);
    }

    #[tokio::test]
    async fn test_remove_missing_key() {
        let store = MemoryStore::new();
        store.remove_value("absent").await.unwrap();
        assert!(store.get_value("absent").await.unwrap().is_none());
    }
}
