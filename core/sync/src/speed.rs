//! Download-speed sampling.
//!
//! The platform download manager keeps a histogram of observed download
//! speeds. Once per auto-sync interval the histogram is read and turned
//! into a single `NETWORK_SPEED` interaction event.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::debug;

use coursesync_common::{Error, Result};

use crate::telemetry::{InteractEvent, InteractSubType, InteractType, TelemetryLogger};

/// Raw histogram bucket (upper bound in KB/s) and the range label it is
/// reported under, in ascending order.
pub const SPEED_RANGES: [(&str, &str); 12] = [
    ("32", "0-32"),
    ("64", "32-64"),
    ("128", "64-128"),
    ("256", "128-256"),
    ("512", "256-512"),
    ("1024", "512-1024"),
    ("1536", "1024-1536"),
    ("2048", "1536-2048"),
    ("2560", "2048-2560"),
    ("3072", "2560-3072"),
    ("3584", "3072-3584"),
    ("4096", "3584-above"),
];

/// Download-speed histogram as produced by the platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadSpeedLog {
    #[serde(rename = "totalKBDownloaded", alias = "totalKBdownloaded", default)]
    pub total_kb_downloaded: f64,
    /// Sample count per raw bucket key. Platforms report plain JSON
    /// numbers, so fractional counts are accepted and rounded.
    #[serde(rename = "distributionInKBPS", default)]
    pub distribution_in_kbps: HashMap<String, f64>,
}

/// Value map of a `NETWORK_SPEED` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpeedValueMap {
    /// Sampling window in seconds.
    pub duration: f64,
    #[serde(rename = "totalKBDownloaded")]
    pub total_kb_downloaded: f64,
    /// Count per range label; every label in [`SPEED_RANGES`] is present.
    #[serde(rename = "distributionInKBPS")]
    pub distribution_in_kbps: BTreeMap<String, u64>,
}

impl NetworkSpeedValueMap {
    /// Build the value map for a sampling window of `interval`.
    ///
    /// Returns `None` when the histogram has no buckets at all.
    pub fn from_log(log: &DownloadSpeedLog, interval: Duration) -> Option<Self> {
        if log.distribution_in_kbps.is_empty() {
            return None;
        }

        let distribution_in_kbps = SPEED_RANGES
            .iter()
            .map(|(bucket, label)| {
                let count = log.distribution_in_kbps.get(*bucket).copied().unwrap_or(0.0);
                (label.to_string(), count.max(0.0).round() as u64)
            })
            .collect();

        Some(Self {
            duration: interval.as_millis() as f64 / 1000.0,
            total_kb_downloaded: log.total_kb_downloaded,
            distribution_in_kbps,
        })
    }
}

/// Platform source of the speed histogram.
#[async_trait]
pub trait SpeedLogSource: Send + Sync {
    async fn fetch_speed_log(&self) -> Result<DownloadSpeedLog>;
}

/// Reads the histogram from the JSON file the download manager writes.
pub struct FileSpeedLogSource {
    path: PathBuf,
}

impl FileSpeedLogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SpeedLogSource for FileSpeedLogSource {
    async fn fetch_speed_log(&self) -> Result<DownloadSpeedLog> {
        let content = fs::read_to_string(&self.path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::Unsupported(format!(
                "download speed log not available at {}",
                self.path.display()
            )),
            _ => Error::Io(e),
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// What a report attempt produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedReport {
    /// One event was logged.
    Emitted,
    /// The histogram was empty; nothing was logged.
    NoSamples,
}

/// Turns the speed histogram into a telemetry event.
pub struct SpeedSampleReporter {
    source: Arc<dyn SpeedLogSource>,
    logger: Arc<dyn TelemetryLogger>,
}

impl SpeedSampleReporter {
    pub fn new(source: Arc<dyn SpeedLogSource>, logger: Arc<dyn TelemetryLogger>) -> Self {
        Self { source, logger }
    }

    /// Sample the histogram for a window of `interval`.
    ///
    /// # Errors
    /// - Source or logger failure; an empty histogram is not an error
    pub async fn report(&self, interval: Duration) -> Result<SpeedReport> {
        let log = self.source.fetch_speed_log().await?;

        let Some(value_map) = NetworkSpeedValueMap::from_log(&log, interval) else {
            debug!("Download speed log is empty, skipping");
            return Ok(SpeedReport::NoSamples);
        };

        self.logger
            .interact(InteractEvent {
                interact_type: InteractType::Other,
                sub_type: InteractSubType::NetworkSpeed,
                env: "sdk".to_string(),
                page_id: "sdk".to_string(),
                id: "sdk".to_string(),
                value_map: serde_json::to_value(&value_map)?,
            })
            .await?;

        Ok(SpeedReport::Emitted)
    }
}
