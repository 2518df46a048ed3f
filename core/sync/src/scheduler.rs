//! Auto-sync scheduling.
//!
//! Every tick runs three independently contained steps:
//! 1. sample the download-speed histogram,
//! 2. push buffered assessment events and content states (concurrently,
//!    only for server-linked profiles),
//! 3. flush buffered telemetry, unless paused.
//!
//! A failure in one step is logged and recorded in the [`TickReport`]; it
//! never stops the following steps or the scheduler itself. Ticks are
//! serialized: a tick never starts while another one is still running.

use futures::future::{join, FutureExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use coursesync_common::{Error, ProfileAccessor, ProfileRequestOptions, Result};
use coursesync_course::{AssessmentEventSync, ContentStateSync, SyncSummary};
use coursesync_storage::PreferenceStore;

use crate::mode::{SyncMode, SyncModePreference};
use crate::speed::{SpeedReport, SpeedSampleReporter};
use crate::telemetry::{TelemetryService, TelemetrySyncStat};

/// Ticks kept for slow subscribers before they start lagging.
const TICK_CHANNEL_CAPACITY: usize = 16;

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSyncConfig {
    /// Tick interval used by [`AutoSyncScheduler::start_configured`].
    pub interval_ms: u64,
    /// When set, [`AutoSyncScheduler::pause`] also skips the course
    /// progress push, not only the telemetry flush.
    pub pause_blocks_sync: bool,
}

impl Default for AutoSyncConfig {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            pause_blocks_sync: false,
        }
    }
}

/// Why a step did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The speed histogram was empty.
    NoSpeedSamples,
    /// No active session profile.
    NoActiveProfile,
    /// The active profile is not linked to a server account.
    ProfileNotServerLinked,
    /// Syncing is paused.
    Paused,
}

/// Outcome of one tick step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    Skipped(SkipReason),
    Failed(String),
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Completed => f.write_str("completed"),
            StepOutcome::Skipped(reason) => write!(f, "skipped ({:?})", reason),
            StepOutcome::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

impl StepOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, StepOutcome::Completed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }
}

/// Emitted after every tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// 1-based tick number within this scheduler.
    pub sequence: u64,
    pub speed_sample: StepOutcome,
    pub assessment_sync: StepOutcome,
    pub content_state_sync: StepOutcome,
    pub telemetry_flush: StepOutcome,
}

/// Collaborators driven by the scheduler.
pub struct AutoSyncDeps {
    pub speed_reporter: SpeedSampleReporter,
    pub profiles: Arc<dyn ProfileAccessor>,
    pub assessments: Arc<dyn AssessmentEventSync>,
    pub content_states: Arc<dyn ContentStateSync>,
    pub telemetry: Arc<dyn TelemetryService>,
}

/// Body of a tick, shared between the scheduler and its timer task.
struct TickRunner {
    deps: AutoSyncDeps,
    should_sync: AtomicBool,
    pause_blocks_sync: bool,
    sequence: AtomicU64,
    tick_lock: Mutex<()>,
}

impl TickRunner {
    async fn run_tick(&self, interval: Duration) -> TickReport {
        let _running = self.tick_lock.lock().await;
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Auto-sync tick {} started", sequence);

        let speed_sample = match contained(self.deps.speed_reporter.report(interval)).await {
            Ok(SpeedReport::Emitted) => StepOutcome::Completed,
            Ok(SpeedReport::NoSamples) => StepOutcome::Skipped(SkipReason::NoSpeedSamples),
            Err(e) => failed("Download speed sampling", e),
        };

        let (assessment_sync, content_state_sync) =
            if self.pause_blocks_sync && !self.should_sync.load(Ordering::SeqCst) {
                debug!("Auto-sync paused, skipping course progress sync");
                (
                    StepOutcome::Skipped(SkipReason::Paused),
                    StepOutcome::Skipped(SkipReason::Paused),
                )
            } else {
                self.sync_course_progress().await
            };

        let telemetry_flush = if self.should_sync.load(Ordering::SeqCst) {
            match contained(self.deps.telemetry.sync()).await {
                Ok(TelemetrySyncStat {
                    synced_event_count,
                    synced_at,
                }) => {
                    info!(
                        "Auto-sync telemetry flush sent {} events at {}",
                        synced_event_count, synced_at
                    );
                    StepOutcome::Completed
                }
                Err(e) => failed("Auto-sync telemetry flush", e),
            }
        } else {
            debug!("Auto-sync paused, skipping telemetry flush");
            StepOutcome::Skipped(SkipReason::Paused)
        };

        TickReport {
            sequence,
            speed_sample,
            assessment_sync,
            content_state_sync,
            telemetry_flush,
        }
    }

    /// Push assessment events and content states side by side. Both are
    /// awaited to completion whatever the other one does.
    async fn sync_course_progress(&self) -> (StepOutcome, StepOutcome) {
        let profile = match contained(
            self.deps
                .profiles
                .get_active_session_profile(ProfileRequestOptions::default()),
        )
        .await
        {
            Ok(profile) => profile,
            Err(Error::NotFound(_)) => {
                debug!("No active profile, skipping course progress sync");
                let skipped = StepOutcome::Skipped(SkipReason::NoActiveProfile);
                return (skipped.clone(), skipped);
            }
            Err(e) => {
                let outcome = failed("Reading active profile", e);
                return (outcome.clone(), outcome);
            }
        };

        if !profile.is_server_linked() {
            debug!("Profile {} is {}, skipping course progress sync", profile.uid, profile.source);
            let skipped = StepOutcome::Skipped(SkipReason::ProfileNotServerLinked);
            return (skipped.clone(), skipped);
        }

        let (assessments, content_states) = join(
            contained(self.deps.assessments.sync_assessment_events()),
            contained(self.deps.content_states.update_content_state()),
        )
        .await;

        (
            summarize("Assessment event sync", assessments),
            summarize("Content state sync", content_states),
        )
    }
}

/// Run a step future, turning a panic into an error so one broken
/// collaborator cannot take down the timer task.
async fn contained<T, F>(step: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(step).catch_unwind().await {
        Ok(result) => result,
        Err(_) => Err(Error::Internal("sync step panicked".to_string())),
    }
}

fn summarize(step: &str, result: Result<SyncSummary>) -> StepOutcome {
    match result {
        Ok(summary) => {
            debug!(
                "{}: {} requests, {} records cleared",
                step, summary.requests_sent, summary.records_cleared
            );
            StepOutcome::Completed
        }
        Err(e) => failed(step, e),
    }
}

/// Record a contained failure. Transient failures are expected to clear up
/// by a later tick and only warrant a warning.
fn failed(step: &str, e: Error) -> StepOutcome {
    if e.is_transient() {
        warn!("{} failed: {}", step, e);
    } else {
        error!("{} failed: {}", step, e);
    }
    StepOutcome::Failed(e.to_string())
}

/// Periodically samples download speed, pushes buffered course progress and
/// flushes telemetry.
pub struct AutoSyncScheduler {
    runner: Arc<TickRunner>,
    sync_mode: SyncModePreference,
    config: AutoSyncConfig,
}

impl AutoSyncScheduler {
    pub fn new(deps: AutoSyncDeps, preferences: Arc<dyn PreferenceStore>, config: AutoSyncConfig) -> Self {
        let runner = TickRunner {
            deps,
            should_sync: AtomicBool::new(false),
            pause_blocks_sync: config.pause_blocks_sync,
            sequence: AtomicU64::new(0),
            tick_lock: Mutex::new(()),
        };

        Self {
            runner: Arc::new(runner),
            sync_mode: SyncModePreference::new(preferences),
            config,
        }
    }

    /// Start ticking every `interval`, first tick one interval from now.
    ///
    /// Enables telemetry flushing. Must be called from within a tokio
    /// runtime. The returned handle emits one [`TickReport`] per tick and
    /// never finishes on its own; stop it with [`AutoSyncHandle::stop`] or
    /// by dropping it.
    ///
    /// # Errors
    /// - `interval` is zero
    pub fn start(&self, interval: Duration) -> Result<AutoSyncHandle> {
        if interval.is_zero() {
            return Err(Error::InvalidInput(
                "auto-sync interval must be positive".to_string(),
            ));
        }

        self.runner.should_sync.store(true, Ordering::SeqCst);

        let (tick_tx, tick_rx) = broadcast::channel(TICK_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let runner = self.runner.clone();
        let task_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("Auto-sync scheduler started with interval {:?}", interval);

            loop {
                tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                // Not raced against cancellation: a started tick always finishes.
                let report = runner.run_tick(interval).await;
                let _ = tick_tx.send(report);
            }

            info!("Auto-sync scheduler stopped");
        });

        Ok(AutoSyncHandle {
            ticks: tick_rx,
            cancel,
            task: Some(task),
        })
    }

    /// Start with the configured interval.
    pub fn start_configured(&self) -> Result<AutoSyncHandle> {
        self.start(Duration::from_millis(self.config.interval_ms))
    }

    /// Run a single tick now, outside the timer.
    pub async fn run_tick(&self, interval: Duration) -> TickReport {
        self.runner.run_tick(interval).await
    }

    /// Stop flushing telemetry. Speed sampling and course progress sync keep
    /// running unless `pause_blocks_sync` is configured.
    pub fn pause(&self) {
        self.runner.should_sync.store(false, Ordering::SeqCst);
    }

    /// Re-enable the telemetry flush from the next tick on.
    pub fn resume(&self) {
        self.runner.should_sync.store(true, Ordering::SeqCst);
    }

    /// Whether the telemetry flush is currently enabled.
    pub fn is_syncing(&self) -> bool {
        self.runner.should_sync.load(Ordering::SeqCst)
    }

    /// Persisted sync mode. Advisory: a running timer does not consult it.
    pub async fn get_sync_mode(&self) -> Result<Option<SyncMode>> {
        self.sync_mode.get_sync_mode().await
    }

    pub async fn set_sync_mode(&self, mode: SyncMode) -> Result<()> {
        self.sync_mode.set_sync_mode(mode).await
    }
}

/// Running scheduler returned by [`AutoSyncScheduler::start`].
///
/// Dropping the handle cancels the timer; a tick already in progress still
/// runs to completion.
pub struct AutoSyncHandle {
    ticks: broadcast::Receiver<TickReport>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl AutoSyncHandle {
    /// Wait for the next completed tick.
    ///
    /// Returns `None` once the scheduler has stopped. Reports missed by a
    /// lagging caller are skipped.
    pub async fn next_tick(&mut self) -> Option<TickReport> {
        loop {
            match self.ticks.recv().await {
                Ok(report) => return Some(report),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    debug!("Tick subscriber lagged by {} reports", missed);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// An additional subscription to tick reports.
    pub fn subscribe(&self) -> broadcast::Receiver<TickReport> {
        self.ticks.resubscribe()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancel the timer and wait for an in-flight tick to finish.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Auto-sync task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for AutoSyncHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
