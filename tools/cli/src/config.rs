//! CLI configuration file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use coursesync_api::ApiConfig;
use coursesync_course::CourseServiceConfig;
use coursesync_faq::FaqServiceConfig;
use coursesync_storage::CacheConfig;
use coursesync_sync::{AutoSyncConfig, TelemetryConfig};

const BEARER_TOKEN_ENV: &str = "COURSESYNC_BEARER_TOKEN";
const USER_TOKEN_ENV: &str = "COURSESYNC_USER_TOKEN";

/// Everything the CLI needs to wire the SDK together. Missing fields take
/// their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    pub api: ApiConfig,
    pub course: CourseServiceConfig,
    pub faq: FaqServiceConfig,
    pub telemetry: TelemetryConfig,
    pub cache: CacheConfig,
    pub auto_sync: AutoSyncConfig,
    /// SQLite file holding preferences, buffers and the cache.
    pub database_path: Option<PathBuf>,
    /// JSON histogram written by the download manager.
    pub speed_log_path: Option<PathBuf>,
}

impl SdkConfig {
    /// Load from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                serde_json::from_str(&content)
                    .with_context(|| format!("Invalid config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(token) = var(BEARER_TOKEN_ENV) {
            self.api.bearer_token = Some(token);
        }
        if let Some(token) = var(USER_TOKEN_ENV) {
            self.api.user_token = Some(token);
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| data_dir().join("coursesync.db"))
    }

    pub fn speed_log_path(&self) -> PathBuf {
        self.speed_log_path
            .clone()
            .unwrap_or_else(|| data_dir().join("download_speed.json"))
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("coursesync")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_takes_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"api": {"host": "https://learn.example.org"}, "auto_sync": {"interval_ms": 5000}}"#,
        )
        .unwrap();

        let config = SdkConfig::load(Some(&path)).unwrap();
        assert_eq!(config.api.host, "https://learn.example.org");
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.auto_sync.interval_ms, 5000);
        assert_eq!(config.course.api_path, "/api/course/v1");
        assert_eq!(config.telemetry.batch_size, 200);
    }

    #[test]
    fn test_env_overrides_tokens() {
        let mut config = SdkConfig::default();
        config.apply_env(|key| match key {
            BEARER_TOKEN_ENV => Some("bearer".to_string()),
            _ => None,
        });
        assert_eq!(config.api.bearer_token.as_deref(), Some("bearer"));
        assert_eq!(config.api.user_token, None);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(SdkConfig::load(Some(&path)).is_err());
    }
}
