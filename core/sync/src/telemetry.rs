//! Telemetry events, the logger that buffers them, and the service that
//! flushes the buffer to the telemetry endpoint.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use coursesync_api::{ApiService, HttpMethod, Request};
use coursesync_common::Result;
use coursesync_storage::Database;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS telemetry_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
"#;

const TELEMETRY_ENDPOINT: &str = "/telemetry";
const TELEMETRY_VERSION: &str = "3.0";

/// Configuration for [`BufferedTelemetry`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Path prefix of the telemetry service.
    pub api_path: String,
    /// Maximum events per upload request.
    pub batch_size: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            api_path: "/api/data/v1".to_string(),
            batch_size: 200,
        }
    }
}

/// Interaction category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractType {
    Other,
}

/// Interaction sub-category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractSubType {
    NetworkSpeed,
}

/// A structured interaction event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractEvent {
    #[serde(rename = "type")]
    pub interact_type: InteractType,
    pub sub_type: InteractSubType,
    pub env: String,
    pub page_id: String,
    pub id: String,
    pub value_map: serde_json::Value,
}

impl InteractEvent {
    /// Wrap this interaction in the telemetry envelope.
    fn envelope(&self, now: DateTime<Utc>) -> serde_json::Value {
        serde_json::json!({
            "eid": "INTERACT",
            "ets": now.timestamp_millis(),
            "ver": TELEMETRY_VERSION,
            "mid": Uuid::new_v4().to_string(),
            "context": { "env": self.env },
            "edata": {
                "type": self.interact_type,
                "subtype": self.sub_type,
                "id": self.id,
                "pageid": self.page_id,
                "extra": self.value_map,
            },
        })
    }
}

/// Records telemetry events.
#[async_trait]
pub trait TelemetryLogger: Send + Sync {
    async fn interact(&self, event: InteractEvent) -> Result<()>;
}

/// Result of a telemetry flush.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySyncStat {
    pub synced_event_count: usize,
    pub synced_at: DateTime<Utc>,
}

/// Flushes buffered telemetry to the remote endpoint.
#[async_trait]
pub trait TelemetryService: Send + Sync {
    async fn sync(&self) -> Result<TelemetrySyncStat>;
}

/// SQLite-buffered telemetry.
///
/// Events are appended locally by [`TelemetryLogger::interact`] and
/// uploaded in batches by [`TelemetryService::sync`]. Rows are deleted only
/// after the endpoint accepted the batch that carried them.
pub struct BufferedTelemetry {
    db: Arc<Database>,
    api: Arc<dyn ApiService>,
    config: TelemetryConfig,
}

impl BufferedTelemetry {
    pub fn new(db: Arc<Database>, api: Arc<dyn ApiService>, config: TelemetryConfig) -> Result<Self> {
        db.migrate(SCHEMA)?;
        Ok(Self { db, api, config })
    }

    /// Number of events waiting for upload.
    pub fn pending_count(&self) -> Result<usize> {
        let count: i64 = self.db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM telemetry_events", [], |row| row.get(0))
        })?;
        Ok(count as usize)
    }

    fn next_batch(&self) -> Result<Vec<(i64, serde_json::Value)>> {
        let limit = self.config.batch_size.max(1) as i64;
        let rows = self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, event FROM telemetry_events ORDER BY id LIMIT ?1")?;
            let rows = stmt.query_map([limit], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })?;

        rows.into_iter()
            .map(|(id, raw)| -> Result<(i64, serde_json::Value)> { Ok((id, serde_json::from_str(&raw)?)) })
            .collect()
    }

    fn delete(&self, ids: &[i64]) -> Result<()> {
        self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare("DELETE FROM telemetry_events WHERE id = ?1")?;
                for id in ids {
                    stmt.execute([id])?;
                }
            }
            tx.commit()
        })
    }
}

#[async_trait]
impl TelemetryLogger for BufferedTelemetry {
    async fn interact(&self, event: InteractEvent) -> Result<()> {
        let now = Utc::now();
        let raw = serde_json::to_string(&event.envelope(now))?;
        debug!("Buffering {:?} interact event", event.sub_type);
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO telemetry_events (event, created_at) VALUES (?1, ?2)",
                params![raw, now.timestamp_millis()],
            )
            .map(|_| ())
        })
    }
}

#[async_trait]
impl TelemetryService for BufferedTelemetry {
    async fn sync(&self) -> Result<TelemetrySyncStat> {
        let mut synced = 0;

        loop {
            let batch = self.next_batch()?;
            if batch.is_empty() {
                break;
            }

            let (ids, events): (Vec<i64>, Vec<serde_json::Value>) = batch.into_iter().unzip();
            let request = Request::builder()
                .with_type(HttpMethod::Post)
                .with_path(format!("{}{}", self.config.api_path, TELEMETRY_ENDPOINT))
                .with_bearer_token(true)
                .with_body(&serde_json::json!({
                    "id": "api.telemetry",
                    "ver": TELEMETRY_VERSION,
                    "params": { "msgid": Uuid::new_v4().to_string() },
                    "ets": Utc::now().timestamp_millis(),
                    "events": events,
                }))
                .build()?;

            self.api.fetch(request).await?;
            self.delete(&ids)?;
            synced += ids.len();
        }

        if synced > 0 {
            info!("Telemetry sync uploaded {} events", synced);
        }

        Ok(TelemetrySyncStat {
            synced_event_count: synced,
            synced_at: Utc::now(),
        })
    }
}
