//! API client configuration.

use serde::{Deserialize, Serialize};

/// Configuration for [`HttpApiService`](crate::HttpApiService).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL requests are resolved against, e.g. `https://learn.example.org`.
    pub host: String,
    /// API bearer token, sent when a request asks for it.
    pub bearer_token: Option<String>,
    /// Logged-in user's token, sent when a request asks for it.
    pub user_token: Option<String>,
    /// Per-request timeout.
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:3000".to_string(),
            bearer_token: None,
            user_token: None,
            timeout_secs: 30,
            user_agent: "coursesync/0.1".to_string(),
        }
    }
}
