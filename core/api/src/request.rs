//! Request description and builder.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ApiError;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

/// A fully described API request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: HttpMethod,
    /// Overrides the configured host when set.
    pub host: Option<String>,
    pub path: String,
    /// Attach the API bearer token.
    pub bearer_token: bool,
    /// Attach the logged-in user's token.
    pub user_token: bool,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl Request {
    /// Start building a request.
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }
}

/// Builder for [`Request`].
#[derive(Debug, Default)]
pub struct RequestBuilder {
    method: Option<HttpMethod>,
    host: Option<String>,
    path: Option<String>,
    bearer_token: bool,
    user_token: bool,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    body: Option<Result<serde_json::Value, String>>,
}

impl RequestBuilder {
    pub fn with_type(mut self, method: HttpMethod) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_bearer_token(mut self, required: bool) -> Self {
        self.bearer_token = required;
        self
    }

    pub fn with_user_token(mut self, required: bool) -> Self {
        self.user_token = required;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Set a JSON body. Serialization errors surface from [`build`](Self::build).
    pub fn with_body<B: Serialize>(mut self, body: &B) -> Self {
        self.body = Some(serde_json::to_value(body).map_err(|e| e.to_string()));
        self
    }

    /// Finish the request.
    ///
    /// # Errors
    /// - Missing method or path
    /// - Body could not be serialized
    pub fn build(self) -> Result<Request, ApiError> {
        let method = self
            .method
            .ok_or_else(|| ApiError::InvalidRequest("request type not set".to_string()))?;
        let path = self
            .path
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ApiError::InvalidRequest("request path not set".to_string()))?;
        let body = self.body.transpose().map_err(ApiError::InvalidRequest)?;

        Ok(Request {
            method,
            host: self.host,
            path,
            bearer_token: self.bearer_token,
            user_token: self.user_token,
            headers: self.headers,
            query: self.query,
            body,
        })
    }
}

/// A received response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the (whitespace-trimmed) body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(self.body.trim()).map_err(|e| ApiError::Decode(e.to_string()))
    }
}
