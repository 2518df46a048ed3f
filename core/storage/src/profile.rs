//! Profile accessor backed by the preference store.

use async_trait::async_trait;
use std::sync::Arc;

use coursesync_common::keys::KEY_ACTIVE_PROFILE;
use coursesync_common::{Error, Profile, ProfileAccessor, ProfileRequestOptions, Result};

use crate::store::PreferenceStore;

/// Reads the active profile that the session layer stores as JSON under
/// [`KEY_ACTIVE_PROFILE`].
pub struct PreferenceProfileAccessor {
    preferences: Arc<dyn PreferenceStore>,
}

impl PreferenceProfileAccessor {
    pub fn new(preferences: Arc<dyn PreferenceStore>) -> Self {
        Self { preferences }
    }

    /// Store `profile` as the active session profile.
    pub async fn set_active_profile(&self, profile: &Profile) -> Result<()> {
        let json = serde_json::to_string(profile)?;
        self.preferences.put_string(KEY_ACTIVE_PROFILE, &json).await
    }
}

#[async_trait]
impl ProfileAccessor for PreferenceProfileAccessor {
    async fn get_active_session_profile(&self, _options: ProfileRequestOptions) -> Result<Profile> {
        let raw = self
            .preferences
            .get_string(KEY_ACTIVE_PROFILE)
            .await?
            .ok_or_else(|| Error::NotFound("No active session profile".to_string()))?;
        Ok(serde_json::from_str(&raw)?)
    }
}
