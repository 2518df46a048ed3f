//! Local persistence for coursesync.
//!
//! This module provides the trait-based interfaces for the two local stores
//! the SDK relies on (string preferences and a JSON key/value store), their
//! in-memory and SQLite implementations, and the TTL-gated read-through
//! cache built on top of them.
//!
//! # Design Principles
//! - Store isolation: callers only see `PreferenceStore` / `KeyValueStore`
//! - Async operations: all store operations are async
//! - Unified error semantics: every backend maps to `coursesync_common::Error`

pub mod cache;
pub mod clock;
pub mod database;
pub mod memory;
pub mod profile;
pub mod store;

pub use cache::{CacheConfig, CachedItemStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use database::Database;
pub use memory::MemoryStore;
pub use profile::PreferenceProfileAccessor;
pub use store::{KeyValueStore, PreferenceStore};
