//! FAQ documents: fetched from the FAQ host, cached, and backed by the copy
//! bundled with the app.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::debug;

use coursesync_api::{fetch_json, ApiService, HttpMethod, Request};
use coursesync_common::{Error, Result};
use coursesync_storage::CachedItemStore;

const FAQ_FILE_KEY_PREFIX: &str = "faq-";
const FAQ_LOCAL_KEY: &str = "faq-";
const FAQ_TTL_KEY: &str = "ttl_faq-";

/// Configuration for the FAQ reader.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaqServiceConfig {
    /// Directory holding the bundled `faq-<language>.json` files.
    pub faq_config_dir_path: PathBuf,
    /// Host serving the published FAQ documents.
    pub faq_url: String,
}

impl Default for FaqServiceConfig {
    fn default() -> Self {
        Self {
            faq_config_dir_path: PathBuf::from("assets/faq"),
            faq_url: "http://localhost:3000".to_string(),
        }
    }
}

/// A FAQ request.
#[derive(Debug, Clone)]
pub struct GetFaqRequest {
    pub language: String,
    /// Overrides [`FaqServiceConfig::faq_url`] when set.
    pub faq_url: Option<String>,
}

/// Reads FAQ documents through the cache gate.
pub struct GetFaqDetailsHandler {
    api: Arc<dyn ApiService>,
    config: FaqServiceConfig,
    cache: Arc<CachedItemStore>,
}

impl GetFaqDetailsHandler {
    pub fn new(api: Arc<dyn ApiService>, config: FaqServiceConfig, cache: Arc<CachedItemStore>) -> Self {
        Self { api, config, cache }
    }

    pub async fn handle(&self, request: &GetFaqRequest) -> Result<serde_json::Value> {
        self.cache
            .get_cached(
                &request.language,
                FAQ_LOCAL_KEY,
                FAQ_TTL_KEY,
                || self.fetch_from_server(request),
                || self.fetch_from_file(&request.language),
            )
            .await
    }

    async fn fetch_from_server(&self, request: &GetFaqRequest) -> Result<serde_json::Value> {
        let host = request.faq_url.as_deref().unwrap_or(&self.config.faq_url);
        let api_request = Request::builder()
            .with_type(HttpMethod::Get)
            .with_host(host)
            .with_path(format!("/{}{}.json", FAQ_FILE_KEY_PREFIX, request.language))
            .build()?;

        Ok(fetch_json(self.api.as_ref(), api_request).await?)
    }

    async fn fetch_from_file(&self, language: &str) -> Result<serde_json::Value> {
        let path = self
            .config
            .faq_config_dir_path
            .join(format!("{}{}.json", FAQ_FILE_KEY_PREFIX, language));
        debug!("Reading bundled FAQ from {}", path.display());

        let content = fs::read_to_string(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(format!("FAQ file {}", path.display())),
            _ => Error::Io(e),
        })?;
        Ok(serde_json::from_str(content.trim())?)
    }
}
