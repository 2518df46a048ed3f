//! Coursesync auto-sync
//!
//! Background synchronization of locally buffered learner data:
//! - Periodic scheduler with pause/resume of the telemetry flush
//! - Download-speed sampling into `NETWORK_SPEED` interaction events
//! - SQLite-buffered telemetry and its batched upload
//! - Persisted auto-sync mode preference

pub mod mode;
pub mod scheduler;
pub mod speed;
pub mod telemetry;

// Re-export main types
pub use mode::{SyncMode, SyncModePreference};
pub use scheduler::{
    AutoSyncConfig, AutoSyncDeps, AutoSyncHandle, AutoSyncScheduler, SkipReason, StepOutcome, TickReport,
};
pub use speed::{
    DownloadSpeedLog, FileSpeedLogSource, NetworkSpeedValueMap, SpeedLogSource, SpeedReport, SpeedSampleReporter,
    SPEED_RANGES,
};
pub use telemetry::{
    BufferedTelemetry, InteractEvent, InteractSubType, InteractType, TelemetryConfig, TelemetryLogger,
    TelemetryService, TelemetrySyncStat,
};
