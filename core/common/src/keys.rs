//! Preference keys shared between crates.

/// Persisted auto-sync mode (see `coursesync_sync::SyncMode`).
pub const KEY_AUTO_SYNC_MODE: &str = "telemetry_auto_sync_mode";

/// JSON-encoded profile of the active session.
pub const KEY_ACTIVE_PROFILE: &str = "active_profile";
