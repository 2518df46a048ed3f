//! Persisted auto-sync mode.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

use coursesync_common::keys::KEY_AUTO_SYNC_MODE;
use coursesync_common::{Error, Result};
use coursesync_storage::PreferenceStore;

/// When auto-sync is allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncMode {
    /// Never sync automatically.
    Off,
    /// Sync on any network.
    AlwaysOn,
    /// Sync only over Wi-Fi.
    OverWifi,
}

impl SyncMode {
    /// The persisted string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Off => "OFF",
            SyncMode::AlwaysOn => "ALWAYS_ON",
            SyncMode::OverWifi => "OVER_WIFI",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "OFF" => Ok(SyncMode::Off),
            "ALWAYS_ON" => Ok(SyncMode::AlwaysOn),
            "OVER_WIFI" => Ok(SyncMode::OverWifi),
            other => Err(Error::InvalidInput(format!("Unknown sync mode: {}", other))),
        }
    }
}

/// Reads and writes the persisted [`SyncMode`].
///
/// Nothing is cached in memory; every read goes to the store so changes
/// made by a settings screen are seen on the next call.
#[derive(Clone)]
pub struct SyncModePreference {
    preferences: Arc<dyn PreferenceStore>,
}

impl SyncModePreference {
    pub fn new(preferences: Arc<dyn PreferenceStore>) -> Self {
        Self { preferences }
    }

    /// The persisted mode, or `None` when unset or unrecognised.
    pub async fn get_sync_mode(&self) -> Result<Option<SyncMode>> {
        let Some(raw) = self.preferences.get_string(KEY_AUTO_SYNC_MODE).await? else {
            return Ok(None);
        };
        match raw.parse() {
            Ok(mode) => Ok(Some(mode)),
            Err(e) => {
                warn!("Ignoring persisted sync mode: {}", e);
                Ok(None)
            }
        }
    }

    pub async fn set_sync_mode(&self, mode: SyncMode) -> Result<()> {
        self.preferences
            .put_string(KEY_AUTO_SYNC_MODE, mode.as_str())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursesync_storage::MemoryStore;

    #[tokio::test]
    async fn test_unset_mode_is_none() {
        let pref = SyncModePreference::new(Arc::new(MemoryStore::new()));
        assert_eq!(pref.get_sync_mode().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let store = Arc::new(MemoryStore::new());
        let pref = SyncModePreference::new(store.clone());
        pref.set_sync_mode(SyncMode::OverWifi).await.unwrap();

        assert_eq!(pref.get_sync_mode().await.unwrap(), Some(SyncMode::OverWifi));
        assert_eq!(
            store.get_string(KEY_AUTO_SYNC_MODE).await.unwrap().as_deref(),
            Some("OVER_WIFI")
        );
    }

    #[tokio::test]
    async fn test_unrecognised_value_is_none() {
        let store = Arc::new(MemoryStore::new());
        store.put_string(KEY_AUTO_SYNC_MODE, "SOMETIMES").await.unwrap();
        let pref = SyncModePreference::new(store);
        assert_eq!(pref.get_sync_mode().await.unwrap(), None);
    }

    #[test]
    fn test_string_forms_agree_with_serde() {
        for mode in [SyncMode::Off, SyncMode::AlwaysOn, SyncMode::OverWifi] {
            let json = serde_json::to_string(&mode).unwrap();
            assert_eq!(json, format!("\"{}\"", mode));
            assert_eq!(mode.as_str().parse::<SyncMode>().unwrap(), mode);
        }
    }
}
