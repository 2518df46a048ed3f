//! Local buffer of content-state changes awaiting upload.

use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use coursesync_common::{Error, Result};
use coursesync_storage::Database;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS content_state_changes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    course_id TEXT NOT NULL,
    batch_id TEXT NOT NULL,
    content_id TEXT NOT NULL,
    status INTEGER NOT NULL,
    last_access_time INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_content_state_user_course
    ON content_state_changes(user_id, course_id);
"#;

/// Consumption status of a content item within a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum ContentStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl From<ContentStatus> for i64 {
    fn from(status: ContentStatus) -> Self {
        match status {
            ContentStatus::NotStarted => 0,
            ContentStatus::InProgress => 1,
            ContentStatus::Completed => 2,
        }
    }
}

impl TryFrom<i64> for ContentStatus {
    type Error = String;

    fn try_from(value: i64) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(ContentStatus::NotStarted),
            1 => Ok(ContentStatus::InProgress),
            2 => Ok(ContentStatus::Completed),
            other => Err(format!("unknown content status {}", other)),
        }
    }
}

/// A buffered content-state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentStateChange {
    /// Row id; `None` until recorded.
    pub id: Option<i64>,
    pub user_id: String,
    pub course_id: String,
    pub batch_id: String,
    pub content_id: String,
    pub status: ContentStatus,
    /// Epoch milliseconds.
    pub last_access_time: i64,
}

impl ContentStateChange {
    pub fn new(
        user_id: impl Into<String>,
        course_id: impl Into<String>,
        batch_id: impl Into<String>,
        content_id: impl Into<String>,
        status: ContentStatus,
        last_access_time: i64,
    ) -> Self {
        Self {
            id: None,
            user_id: user_id.into(),
            course_id: course_id.into(),
            batch_id: batch_id.into(),
            content_id: content_id.into(),
            status,
            last_access_time,
        }
    }
}

/// SQLite-backed buffer of [`ContentStateChange`]s.
pub struct ContentStateBuffer {
    db: Arc<Database>,
}

impl ContentStateBuffer {
    /// Open the buffer, creating its table if needed.
    pub fn new(db: Arc<Database>) -> Result<Self> {
        db.migrate(SCHEMA)?;
        Ok(Self { db })
    }

    /// Append a change. Returns the assigned row id.
    pub fn record(&self, change: &ContentStateChange) -> Result<i64> {
        debug!(
            "Buffering content state {} for {}/{}",
            change.content_id, change.user_id, change.course_id
        );
        self.db.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO content_state_changes
                (user_id, course_id, batch_id, content_id, status, last_access_time)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    change.user_id,
                    change.course_id,
                    change.batch_id,
                    change.content_id,
                    i64::from(change.status),
                    change.last_access_time,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// All buffered changes, oldest first.
    pub fn list_all(&self) -> Result<Vec<ContentStateChange>> {
        self.query(
            "SELECT id, user_id, course_id, batch_id, content_id, status, last_access_time \
             FROM content_state_changes ORDER BY id",
            &[],
        )
    }

    /// Buffered changes for one user's course, oldest first.
    pub fn list_for_course(&self, user_id: &str, course_id: &str) -> Result<Vec<ContentStateChange>> {
        self.query(
            "SELECT id, user_id, course_id, batch_id, content_id, status, last_access_time \
             FROM content_state_changes WHERE user_id = ?1 AND course_id = ?2 ORDER BY id",
            &[&user_id, &course_id],
        )
    }

    /// Delete exactly the given rows.
    pub fn delete(&self, ids: &[i64]) -> Result<usize> {
        self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut deleted = 0;
            {
                let mut stmt = tx.prepare("DELETE FROM content_state_changes WHERE id = ?1")?;
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
            conn.query_row("SELECT COUNT(*) FROM content_state_changes", [], |row| row.get(0))
        })?;
        Ok(count as usize)
    }

    fn query(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<ContentStateChange>> {
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(args, |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                ))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })?;

        rows.into_iter()
            .map(|(id, user_id, course_id, batch_id, content_id, status, last_access_time)| -> Result<ContentStateChange> {
                Ok(ContentStateChange {
                    id: Some(id),
                    user_id,
                    course_id,
                    batch_id,
                    content_id,
                    status: ContentStatus::try_from(status).map_err(Error::Database)?,
                    last_access_time,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> ContentStateBuffer {
        ContentStateBuffer::new(Arc::new(Database::in_memory().unwrap())).unwrap()
    }

    #[test]
    fn test_record_and_list() {
        let buffer = buffer();
        let id = buffer
            .record(&ContentStateChange::new("u1", "c1", "b1", "do_1", ContentStatus::InProgress, 10))
            .unwrap();
        buffer
            .record(&ContentStateChange::new("u1", "c2", "b2", "do_2", ContentStatus::Completed, 20))
            .unwrap();

        let all = buffer.list_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, Some(id));
        assert_eq!(all[0].status, ContentStatus::InProgress);

        let course = buffer.list_for_course("u1", "c2").unwrap();
        assert_eq!(course.len(), 1);
        assert_eq!(course[0].content_id, "do_2");
    }

    #[test]
    fn test_delete_only_given_ids() {
        let buffer = buffer();
        let first = buffer
            .record(&ContentStateChange::new("u1", "c1", "b1", "do_1", ContentStatus::InProgress, 10))
            .unwrap();
        buffer
            .record(&ContentStateChange::new("u1", "c1", "b1", "do_2", ContentStatus::InProgress, 11))
            .unwrap();

        assert_eq!(buffer.delete(&[first, 999]).unwrap(), 1);
        assert_eq!(buffer.count().unwrap(), 1);
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(serde_json::to_string(&ContentStatus::Completed).unwrap(), "2");
        assert!(serde_json::from_str::<ContentStatus>("7").is_err());
        assert!(ContentStatus::Completed > ContentStatus::InProgress);
    }
}
