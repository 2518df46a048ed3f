//! reqwest-backed API service.

use async_trait::async_trait;
use reqwest::{header, Client, Method};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::request::{HttpMethod, Request, Response};
use crate::service::ApiService;

/// Header carrying the logged-in user's token.
const USER_TOKEN_HEADER: &str = "X-Authenticated-User-Token";

/// HTTP implementation of [`ApiService`].
pub struct HttpApiService {
    http: Client,
    config: ApiConfig,
}

impl HttpApiService {
    /// Create a new HTTP API service.
    ///
    /// # Errors
    /// - The underlying HTTP client could not be constructed
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let http = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ApiError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Resolve the absolute URL of `request`.
    ///
    /// The path is appended to the host, so a host that carries a base path
    /// (`https://cdn.example.org/public/faq`) keeps it.
    pub fn resolve_url(&self, request: &Request) -> Result<Url, ApiError> {
        let host = request.host.as_deref().unwrap_or(&self.config.host);
        let base = Url::parse(host)
            .map_err(|e| ApiError::InvalidRequest(format!("Invalid host {}: {}", host, e)))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidRequest(format!("Invalid host {}", host)));
        }

        let url = format!(
            "{}/{}",
            base.as_str().trim_end_matches('/'),
            request.path.trim_start_matches('/')
        );
        Url::parse(&url).map_err(|e| ApiError::InvalidRequest(format!("Invalid path {}: {}", request.path, e)))
    }

    fn method(method: HttpMethod) -> Method {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

#[async_trait]
impl ApiService for HttpApiService {
    async fn fetch(&self, request: Request) -> Result<Response, ApiError> {
        let url = self.resolve_url(&request)?;
        debug!("{:?} {}", request.method, url);

        let mut builder = self.http.request(Self::method(request.method), url);

        if request.bearer_token {
            if let Some(token) = &self.config.bearer_token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
        }
        if request.user_token {
            if let Some(token) = &self.config.user_token {
                builder = builder.header(USER_TOKEN_HEADER, token.as_str());
            }
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("Failed to read response body: {}", e)))?;

        if status.is_success() {
            Ok(Response::new(status.as_u16(), body))
        } else {
            Err(ApiError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}
