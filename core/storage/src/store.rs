//! Store trait definitions.

use async_trait::async_trait;

use coursesync_common::Result;

/// Persistent string preferences (the device's shared-preferences area).
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Read a preference.
    ///
    /// # Returns
    /// `None` when the key has never been written.
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Write a preference, replacing any previous value.
    async fn put_string(&self, key: &str, value: &str) -> Result<()>;
}

/// Key/value store for JSON payloads.
///
/// Values are opaque strings; callers own their encoding.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get the value stored under `key`.
    async fn get_value(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set_value(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn remove_value(&self, key: &str) -> Result<()>;
}
