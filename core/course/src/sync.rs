//! Sync handler contracts consumed by the auto-sync scheduler.

use async_trait::async_trait;

use coursesync_common::Result;

/// Outcome of one buffer flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Remote requests that were accepted.
    pub requests_sent: usize,
    /// Local buffer rows cleared after acceptance.
    pub records_cleared: usize,
}

impl SyncSummary {
    pub fn is_empty(&self) -> bool {
        self.requests_sent == 0
    }
}

/// Pushes buffered content-state changes to the remote service.
#[async_trait]
pub trait ContentStateSync: Send + Sync {
    async fn update_content_state(&self) -> Result<SyncSummary>;
}

/// Pushes buffered assessment events to the remote service.
#[async_trait]
pub trait AssessmentEventSync: Send + Sync {
    async fn sync_assessment_events(&self) -> Result<SyncSummary>;
}
