//! Learner profile model and the accessor the sync machinery consumes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Where a profile's data originates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProfileSource {
    /// Created on the device, never linked to a server account.
    Local,
    /// Linked to (or merged with) a server-side account.
    Server,
}

impl fmt::Display for ProfileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileSource::Local => write!(f, "LOCAL"),
            ProfileSource::Server => write!(f, "SERVER"),
        }
    }
}

/// A learner profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Unique identifier; for server profiles this is the remote user id.
    pub uid: String,
    /// Display name.
    #[serde(default)]
    pub handle: String,
    /// Provenance.
    pub source: ProfileSource,
}

impl Profile {
    /// Create a profile.
    ///
    /// # Errors
    /// - Returns error if `uid` is empty
    pub fn new(uid: impl Into<String>, source: ProfileSource) -> Result<Self> {
        let uid = uid.into();
        if uid.is_empty() {
            return Err(Error::InvalidInput("Profile uid cannot be empty".to_string()));
        }
        Ok(Self {
            uid,
            handle: String::new(),
            source,
        })
    }

    /// Whether remote sync has anything meaningful to push for this profile.
    pub fn is_server_linked(&self) -> bool {
        self.source == ProfileSource::Server
    }
}

/// Options for reading the active profile.
#[derive(Debug, Clone, Default)]
pub struct ProfileRequestOptions {
    /// Profile fields the caller needs populated.
    pub required_fields: Vec<String>,
}

/// Accessor for the active session's profile.
#[async_trait]
pub trait ProfileAccessor: Send + Sync {
    /// Return the profile of the active session.
    ///
    /// # Errors
    /// - No active session
    /// - Backing store failure
    async fn get_active_session_profile(&self, options: ProfileRequestOptions) -> Result<Profile>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_source_wire_format() {
        let json = serde_json::to_string(&ProfileSource::Server).unwrap();
        assert_eq!(json, "\"SERVER\"");

        let profile: Profile =
            serde_json::from_str(r#"{"uid":"u-1","source":"LOCAL"}"#).unwrap();
        assert_eq!(profile.source, ProfileSource::Local);
        assert!(!profile.is_server_linked());
    }

    #[test]
    fn test_empty_uid_rejected() {
        assert!(Profile::new("", ProfileSource::Server).is_err());
        assert!(Profile::new("u-1", ProfileSource::Server).unwrap().is_server_linked());
    }
}
