//! Remote "update content state" request.

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use coursesync_api::{ApiService, HttpMethod, Request};
use coursesync_common::Result;

use crate::buffer::{ContentStateChange, ContentStatus};
use crate::config::CourseServiceConfig;

const UPDATE_CONTENT_STATE_ENDPOINT: &str = "/content/state/update";

/// One content's state inside an update request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentStateUpdate {
    pub content_id: String,
    pub course_id: String,
    pub batch_id: String,
    pub status: ContentStatus,
    pub last_access_time: String,
}

impl From<&ContentStateChange> for ContentStateUpdate {
    fn from(change: &ContentStateChange) -> Self {
        Self {
            content_id: change.content_id.clone(),
            course_id: change.course_id.clone(),
            batch_id: change.batch_id.clone(),
            status: change.status,
            last_access_time: format_access_time(change.last_access_time),
        }
    }
}

/// Body of the update request for one user.
///
/// `contents` carries absolute states and `assessments` complete attempts,
/// so resubmitting the same request has the same remote effect.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContentStateRequest {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contents: Vec<ContentStateUpdate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assessments: Vec<serde_json::Value>,
}

/// Submits [`UpdateContentStateRequest`]s to the course service.
#[derive(Clone)]
pub struct UpdateContentStateApiHandler {
    api: Arc<dyn ApiService>,
    config: CourseServiceConfig,
}

impl UpdateContentStateApiHandler {
    pub fn new(api: Arc<dyn ApiService>, config: CourseServiceConfig) -> Self {
        Self { api, config }
    }

    /// Submit `request`; any 2xx response is acceptance.
    pub async fn handle(&self, request: &UpdateContentStateRequest) -> Result<serde_json::Value> {
        let api_request = Request::builder()
            .with_type(HttpMethod::Patch)
            .with_path(format!("{}{}", self.config.api_path, UPDATE_CONTENT_STATE_ENDPOINT))
            .with_bearer_token(true)
            .with_user_token(true)
            .with_body(&serde_json::json!({ "request": request }))
            .build()?;

        let response = self.api.fetch(api_request).await?;
        if response.body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(response.json()?)
    }
}

fn format_access_time(millis: i64) -> String {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S:%3f%z").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursesync_api::MockApiService;

    #[test]
    fn test_access_time_format() {
        assert_eq!(format_access_time(0), "1970-01-01 00:00:00:000+0000");
    }

    #[tokio::test]
    async fn test_request_shape() {
        let api = Arc::new(MockApiService::new());
        let handler = UpdateContentStateApiHandler::new(api.clone(), CourseServiceConfig::default());

        let change = ContentStateChange::new("u1", "c1", "b1", "do_1", ContentStatus::Completed, 0);
        let request = UpdateContentStateRequest {
            user_id: "u1".into(),
            contents: vec![ContentStateUpdate::from(&change)],
            assessments: Vec::new(),
        };
        handler.handle(&request).await.unwrap();

        let sent = api.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, HttpMethod::Patch);
        assert_eq!(sent[0].path, "/api/course/v1/content/state/update");
        let body = sent[0].body.clone().unwrap();
        assert_eq!(body["request"]["userId"], "u1");
        assert_eq!(body["request"]["contents"][0]["status"], 2);
        assert!(body["request"].get("assessments").is_none());
    }
}
