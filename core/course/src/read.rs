//! Cached content-state reads.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use coursesync_api::{fetch_json, ApiService, HttpMethod, Request};
use coursesync_common::Result;
use coursesync_storage::CachedItemStore;

use crate::buffer::ContentStateBuffer;
use crate::config::CourseServiceConfig;
use crate::update::ContentStateUpdate;

const GET_CONTENT_STATE_KEY_PREFIX: &str = "getContentState";
const GET_CONTENT_STATE_TTL_PREFIX: &str = "ttl_getContentState";
const GET_CONTENT_STATE_ENDPOINT: &str = "/content/state/read";

/// Request for a learner's content states within a course batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetContentStateRequest {
    pub user_id: String,
    pub course_id: String,
    pub batch_id: String,
    /// Empty means "all contents of the course"; omitted from the wire body.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

/// Reads content states remote-first through the cache gate, falling back
/// to the locally buffered states when the course service is unreachable.
pub struct GetContentStateHandler {
    api: Arc<dyn ApiService>,
    config: CourseServiceConfig,
    cache: Arc<CachedItemStore>,
    buffer: Arc<ContentStateBuffer>,
}

impl GetContentStateHandler {
    pub fn new(
        api: Arc<dyn ApiService>,
        config: CourseServiceConfig,
        cache: Arc<CachedItemStore>,
        buffer: Arc<ContentStateBuffer>,
    ) -> Self {
        Self {
            api,
            config,
            cache,
            buffer,
        }
    }

    pub async fn handle(&self, request: &GetContentStateRequest) -> Result<serde_json::Value> {
        let namespace = format!("{}_{}", request.user_id, request.course_id);
        self.cache
            .get_cached(
                &namespace,
                GET_CONTENT_STATE_KEY_PREFIX,
                GET_CONTENT_STATE_TTL_PREFIX,
                || self.fetch_from_api(request),
                || self.fetch_from_buffer(request),
            )
            .await
    }

    async fn fetch_from_api(&self, request: &GetContentStateRequest) -> Result<serde_json::Value> {
        let api_request = Request::builder()
            .with_type(HttpMethod::Post)
            .with_path(format!("{}{}", self.config.api_path, GET_CONTENT_STATE_ENDPOINT))
            .with_bearer_token(true)
            .with_user_token(true)
            .with_body(&serde_json::json!({ "request": request }))
            .build()?;

        Ok(fetch_json(self.api.as_ref(), api_request).await?)
    }

    /// Shape the buffered states like the remote `result.contentList`.
    async fn fetch_from_buffer(&self, request: &GetContentStateRequest) -> Result<serde_json::Value> {
        let contents: Vec<ContentStateUpdate> = self
            .buffer
            .list_for_course(&request.user_id, &request.course_id)?
            .iter()
            .filter(|c| c.batch_id == request.batch_id)
            .filter(|c| request.content_ids.is_empty() || request.content_ids.contains(&c.content_id))
            .map(ContentStateUpdate::from)
            .collect();

        Ok(serde_json::json!({ "result": { "contentList": contents } }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{ContentStateChange, ContentStatus};
    use coursesync_api::{ApiError, MockApiService};
    use coursesync_storage::{CacheConfig, Database, MemoryStore};
    use serde_json::json;

    fn setup() -> (Arc<MockApiService>, Arc<ContentStateBuffer>, GetContentStateHandler) {
        let api = Arc::new(MockApiService::new());
        let buffer = Arc::new(ContentStateBuffer::new(Arc::new(Database::in_memory().unwrap())).unwrap());
        let cache = Arc::new(CachedItemStore::new(Arc::new(MemoryStore::new()), CacheConfig::default()));
        let handler = GetContentStateHandler::new(api.clone(), CourseServiceConfig::default(), cache, buffer.clone());
        (api, buffer, handler)
    }

    fn request() -> GetContentStateRequest {
        GetContentStateRequest {
            user_id: "u1".into(),
            course_id: "c1".into(),
            batch_id: "b1".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_remote_result_is_cached() {
        let (api, _buffer, handler) = setup();
        api.enqueue_json(json!({"result": {"contentList": [{"contentId": "do_1"}]}}));

        let first = handler.handle(&request()).await.unwrap();
        let second = handler.handle(&request()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(api.request_count(), 1);

        let body = api.requests()[0].body.clone().unwrap();
        assert_eq!(api.requests()[0].path, "/api/course/v1/content/state/read");
        assert!(body["request"].get("contentIds").is_none());
    }

    #[tokio::test]
    async fn test_offline_falls_back_to_buffer() {
        let (api, buffer, handler) = setup();
        buffer
            .record(&ContentStateChange::new("u1", "c1", "b1", "do_1", ContentStatus::Completed, 0))
            .unwrap();
        buffer
            .record(&ContentStateChange::new("u1", "c1", "b2", "do_2", ContentStatus::Completed, 0))
            .unwrap();
        api.enqueue(Err(ApiError::Network("offline".into())));

        let value = handler.handle(&request()).await.unwrap();
        let list = value["result"]["contentList"].as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["contentId"], "do_1");
    }
}
