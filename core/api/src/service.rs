//! API service trait definition.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::ApiError;
use crate::request::{Request, Response};

/// Executes API requests.
///
/// Implementations must return `Ok` only for 2xx responses; any other
/// status is reported as [`ApiError::Status`].
#[async_trait]
pub trait ApiService: Send + Sync {
    async fn fetch(&self, request: Request) -> Result<Response, ApiError>;
}

/// Execute `request` and decode the response body as JSON.
pub async fn fetch_json<T: DeserializeOwned>(
    api: &dyn ApiService,
    request: Request,
) -> Result<T, ApiError> {
    api.fetch(request).await?.json()
}
