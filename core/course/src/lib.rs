//! Course progress plumbing: locally buffered content-state changes and
//! assessment events, the handlers that push them to the course service,
//! and the cached content-state reader.

pub mod assessment;
pub mod buffer;
pub mod config;
pub mod content_state;
pub mod read;
pub mod sync;
pub mod update;

pub use assessment::{AssessmentEvent, AssessmentEventBuffer, AssessmentEventSyncHandler};
pub use buffer::{ContentStateBuffer, ContentStateChange, ContentStatus};
pub use config::CourseServiceConfig;
pub use content_state::ContentStatesSyncHandler;
pub use read::{GetContentStateHandler, GetContentStateRequest};
pub use sync::{AssessmentEventSync, ContentStateSync, SyncSummary};
pub use update::{ContentStateUpdate, UpdateContentStateApiHandler, UpdateContentStateRequest};
