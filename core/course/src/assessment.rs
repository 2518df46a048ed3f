//! Buffered assessment events and their upload.

use async_trait::async_trait;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use coursesync_common::{Error, Result};
use coursesync_storage::Database;

use crate::sync::{AssessmentEventSync, SyncSummary};
use crate::update::{UpdateContentStateApiHandler, UpdateContentStateRequest};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS assessment_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    course_id TEXT NOT NULL,
    batch_id TEXT NOT NULL,
    content_id TEXT NOT NULL,
    attempt_id TEXT NOT NULL,
    assessment_ts INTEGER NOT NULL,
    event TEXT NOT NULL
);
"#;

/// One captured assessment telemetry event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentEvent {
    pub id: Option<i64>,
    pub user_id: String,
    pub course_id: String,
    pub batch_id: String,
    pub content_id: String,
    pub attempt_id: String,
    /// Epoch milliseconds.
    pub assessment_ts: i64,
    /// The raw assessment event as captured by the player.
    pub event: serde_json::Value,
}

/// SQLite-backed buffer of [`AssessmentEvent`]s.
pub struct AssessmentEventBuffer {
    db: Arc<Database>,
}

impl AssessmentEventBuffer {
    pub fn new(db: Arc<Database>) -> Result<Self> {
        db.migrate(SCHEMA)?;
        Ok(Self { db })
    }

    pub fn record(&self, event: &AssessmentEvent) -> Result<i64> {
        let raw = serde_json::to_string(&event.event)?;
        self.db.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO assessment_events
                (user_id, course_id, batch_id, content_id, attempt_id, assessment_ts, event)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    event.user_id,
                    event.course_id,
                    event.batch_id,
                    event.content_id,
                    event.attempt_id,
                    event.assessment_ts,
                    raw,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// All persisted events, oldest first.
    pub fn list_all(&self) -> Result<Vec<AssessmentEvent>> {
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, course_id, batch_id, content_id, attempt_id, assessment_ts, event \
                 FROM assessment_events ORDER BY assessment_ts, id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })?;

        rows.into_iter()
            .map(
                |(id, user_id, course_id, batch_id, content_id, attempt_id, assessment_ts, raw)|
                 -> Result<AssessmentEvent> {
                    Ok(AssessmentEvent {
                        id: Some(id),
                        user_id,
                        course_id,
                        batch_id,
                        content_id,
                        attempt_id,
                        assessment_ts,
                        event: serde_json::from_str(&raw)?,
                    })
                },
            )
            .collect()
    }

    pub fn delete(&self, ids: &[i64]) -> Result<usize> {
        self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut deleted = 0;
            {
                let mut stmt = tx.prepare("DELETE FROM assessment_events WHERE id = ?1")?;
                for id in ids {
                    deleted += stmt.execute([id])?;
                }
            }
            tx.commit()?;
            Ok(deleted)
        })
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self.db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM assessment_events", [], |row| row.get(0))
        })?;
        Ok(count as usize)
    }
}

/// Attempt key: course, batch, content, attempt.
type AttemptKey = (String, String, String, String);

/// Pushes persisted assessment events, one request per user, grouping
/// events into attempts.
pub struct AssessmentEventSyncHandler {
    api_handler: UpdateContentStateApiHandler,
    buffer: Arc<AssessmentEventBuffer>,
}

impl AssessmentEventSyncHandler {
    pub fn new(api_handler: UpdateContentStateApiHandler, buffer: Arc<AssessmentEventBuffer>) -> Self {
        Self { api_handler, buffer }
    }

    fn build_assessments(user_id: &str, events: Vec<AssessmentEvent>) -> (Vec<serde_json::Value>, Vec<i64>) {
        let mut attempts: BTreeMap<AttemptKey, (i64, Vec<serde_json::Value>)> = BTreeMap::new();
        let mut ids = Vec::with_capacity(events.len());

        for event in events {
            ids.extend(event.id);
            let key = (event.course_id, event.batch_id, event.content_id, event.attempt_id);
            let (ts, captured) = attempts.entry(key).or_insert((event.assessment_ts, Vec::new()));
            *ts = (*ts).max(event.assessment_ts);
            captured.push(event.event);
        }

        let assessments = attempts
            .into_iter()
            .map(|((course_id, batch_id, content_id, attempt_id), (ts, events))| {
                serde_json::json!({
                    "assessmentTs": ts,
                    "batchId": batch_id,
                    "courseId": course_id,
                    "userId": user_id,
                    "attemptId": attempt_id,
                    "contentId": content_id,
                    "events": events,
                })
            })
            .collect();

        (assessments, ids)
    }
}

#[async_trait]
impl AssessmentEventSync for AssessmentEventSyncHandler {
    async fn sync_assessment_events(&self) -> Result<SyncSummary> {
        let events = self.buffer.list_all()?;
        if events.is_empty() {
            debug!("No persisted assessment events");
            return Ok(SyncSummary::default());
        }

        let mut per_user: BTreeMap<String, Vec<AssessmentEvent>> = BTreeMap::new();
        for event in events {
            per_user.entry(event.user_id.clone()).or_default().push(event);
        }

        let mut summary = SyncSummary::default();
        let mut failures = Vec::new();

        for (user_id, events) in per_user {
            let (assessments, ids) = Self::build_assessments(&user_id, events);
            let request = UpdateContentStateRequest {
                user_id: user_id.clone(),
                contents: Vec::new(),
                assessments,
            };

            match self.api_handler.handle(&request).await {
                Ok(_) => {
                    summary.requests_sent += 1;
                    match self.buffer.delete(&ids) {
                        Ok(cleared) => summary.records_cleared += cleared,
                        Err(e) => {
                            warn!("Failed to clear assessment events of {}: {}", user_id, e);
                            failures.push(format!("{}: {}", user_id, e));
                        }
                    }
                }
                Err(e) => {
                    warn!("Assessment sync for {} failed: {}", user_id, e);
                    failures.push(format!("{}: {}", user_id, e));
                }
            }
        }

        info!(
            "Assessment sync: {} requests, {} events cleared, {} failed",
            summary.requests_sent,
            summary.records_cleared,
            failures.len()
        );

        if failures.is_empty() {
            Ok(summary)
        } else {
            Err(Error::Network(format!(
                "assessment sync failed for {} user(s): {}",
                failures.len(),
                failures.join("; ")
            )))
        }
    }
}
