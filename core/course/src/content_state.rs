//! Upload of buffered content-state changes.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use coursesync_common::{Error, Result};

use crate::buffer::{ContentStateBuffer, ContentStateChange};
use crate::sync::{ContentStateSync, SyncSummary};
use crate::update::{ContentStateUpdate, UpdateContentStateApiHandler, UpdateContentStateRequest};

/// Pushes every buffered content-state change, one request per user, and
/// clears the submitted rows once the remote has accepted them.
///
/// A crash between submit and clear leaves the rows in place; the next run
/// resubmits the same absolute states, which is harmless.
pub struct ContentStatesSyncHandler {
    api_handler: UpdateContentStateApiHandler,
    buffer: Arc<ContentStateBuffer>,
}

/// Changes for one user after coalescing.
struct UserBatch {
    contents: Vec<ContentStateUpdate>,
    row_ids: Vec<i64>,
}

impl ContentStatesSyncHandler {
    pub fn new(api_handler: UpdateContentStateApiHandler, buffer: Arc<ContentStateBuffer>) -> Self {
        Self { api_handler, buffer }
    }

    /// Group changes per user, keeping one entry per course/batch/content
    /// with the furthest status and latest access time.
    fn coalesce(changes: Vec<ContentStateChange>) -> BTreeMap<String, UserBatch> {
        type ContentKey = (String, String, String);
        let mut per_user: BTreeMap<String, (BTreeMap<ContentKey, ContentStateChange>, Vec<i64>)> =
            BTreeMap::new();

        for change in changes {
            let (latest, ids) = per_user.entry(change.user_id.clone()).or_default();
            if let Some(id) = change.id {
                ids.push(id);
            }
            let key = (
                change.course_id.clone(),
                change.batch_id.clone(),
                change.content_id.clone(),
            );
            match latest.get_mut(&key) {
                Some(existing) => {
                    existing.status = existing.status.max(change.status);
                    existing.last_access_time = existing.last_access_time.max(change.last_access_time);
                }
                None => {
                    latest.insert(key, change);
                }
            }
        }

        per_user
            .into_iter()
            .map(|(user_id, (latest, row_ids))| {
                let contents = latest.values().map(ContentStateUpdate::from).collect();
                (user_id, UserBatch { contents, row_ids })
            })
            .collect()
    }
}

#[async_trait]
impl ContentStateSync for ContentStatesSyncHandler {
    async fn update_content_state(&self) -> Result<SyncSummary> {
        let changes = self.buffer.list_all()?;
        if changes.is_empty() {
            debug!("No buffered content state changes");
            return Ok(SyncSummary::default());
        }

        let mut summary = SyncSummary::default();
        let mut failures = Vec::new();

        for (user_id, batch) in Self::coalesce(changes) {
            let request = UpdateContentStateRequest {
                user_id: user_id.clone(),
                contents: batch.contents,
                assessments: Vec::new(),
            };

            match self.api_handler.handle(&request).await {
                Ok(_) => {
                    summary.requests_sent += 1;
                    match self.buffer.delete(&batch.row_ids) {
                        Ok(cleared) => summary.records_cleared += cleared,
                        Err(e) => {
                            // Rows stay buffered; resubmitting them is harmless.
                            warn!("Failed to clear content states of {}: {}", user_id, e);
                            failures.push(format!("{}: {}", user_id, e));
                        }
                    }
                }
                Err(e) => {
                    warn!("Content state update for {} failed: {}", user_id, e);
                    failures.push(format!("{}: {}", user_id, e));
                }
            }
        }

        info!(
            "Content state sync: {} requests, {} records cleared, {} failed",
            summary.requests_sent,
            summary.records_cleared,
            failures.len()
        );

        if failures.is_empty() {
            Ok(summary)
        } else {
            Err(Error::Network(format!(
                "content state update failed for {} user(s): {}",
                failures.len(),
                failures.join("; ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ContentStatus;
    use crate::config::CourseServiceConfig;
    use coursesync_api::{ApiError, MockApiService};
    use coursesync_storage::Database;

    fn setup() -> (Arc<MockApiService>, Arc<ContentStateBuffer>, ContentStatesSyncHandler) {
        let api = Arc::new(MockApiService::new());
        let buffer = Arc::new(ContentStateBuffer::new(Arc::new(Database::in_memory().unwrap())).unwrap());
        let handler = ContentStatesSyncHandler::new(
            UpdateContentStateApiHandler::new(api.clone(), CourseServiceConfig::default()),
            buffer.clone(),
        );
        (api, buffer, handler)
    }

    #[tokio::test]
    async fn test_empty_buffer_sends_nothing() {
        let (api, _buffer, handler) = setup();
        let summary = handler.update_content_state().await.unwrap();
        assert!(summary.is_empty());
        assert_eq!(api.request_count(), 0);
    }

    #[tokio::test]
    async fn test_coalesces_and_clears_on_success() {
        let (api, buffer, handler) = setup();
        buffer
            .record(&ContentStateChange::new("u1", "c1", "b1", "do_1", ContentStatus::Completed, 10))
            .unwrap();
        buffer
            .record(&ContentStateChange::new("u1", "c1", "b1", "do_1", ContentStatus::InProgress, 20))
            .unwrap();

        let summary = handler.update_content_state().await.unwrap();
        assert_eq!(summary.requests_sent, 1);
        assert_eq!(summary.records_cleared, 2);
        assert_eq!(buffer.count().unwrap(), 0);

        let body = api.requests()[0].body.clone().unwrap();
        let contents = body["request"]["contents"].as_array().unwrap().clone();
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0]["status"], 2);
    }

    #[tokio::test]
    async fn test_failed_user_keeps_rows_and_others_proceed() {
        let (api, buffer, handler) = setup();
        buffer
            .record(&ContentStateChange::new("u1", "c1", "b1", "do_1", ContentStatus::InProgress, 10))
            .unwrap();
        buffer
            .record(&ContentStateChange::new("u2", "c1", "b1", "do_1", ContentStatus::InProgress, 10))
            .unwrap();
        api.enqueue(Err(ApiError::Network("timeout".into())));

        let err = handler.update_content_state().await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
        assert_eq!(api.request_count(), 2);

        let remaining = buffer.list_all().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].user_id, "u1");
    }

    #[tokio::test]
    async fn test_clear_failure_does_not_stop_other_users() {
        let api = Arc::new(MockApiService::new());
        let db = Arc::new(Database::in_memory().unwrap());
        let buffer = Arc::new(ContentStateBuffer::new(db.clone()).unwrap());
        let handler = ContentStatesSyncHandler::new(
            UpdateContentStateApiHandler::new(api.clone(), CourseServiceConfig::default()),
            buffer.clone(),
        );
        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER keep_u1 BEFORE DELETE ON content_state_changes
                 WHEN OLD.user_id = 'u1' BEGIN SELECT RAISE(ABORT, 'locked'); END;",
            )
        })
        .unwrap();
        buffer
            .record(&ContentStateChange::new("u1", "c1", "b1", "do_1", ContentStatus::InProgress, 10))
            .unwrap();
        buffer
            .record(&ContentStateChange::new("u2", "c1", "b1", "do_1", ContentStatus::Completed, 10))
            .unwrap();

        assert!(handler.update_content_state().await.is_err());
        assert_eq!(api.request_count(), 2);

        let remaining = buffer.list_all().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].user_id, "u1");
    }

    #[tokio::test]
    async fn test_retry_resubmits_same_request() {
        let (api, buffer, handler) = setup();
        buffer
            .record(&ContentStateChange::new("u1", "c1", "b1", "do_1", ContentStatus::InProgress, 10))
            .unwrap();
        api.enqueue(Err(ApiError::Status {
            status: 503,
            body: String::new(),
        }));

        assert!(handler.update_content_state().await.is_err());
        handler.update_content_state().await.unwrap();

        let requests = api.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].body, requests[1].body);
        assert_eq!(buffer.count().unwrap(), 0);
    }
}
