//! Common utilities and types shared across coursesync modules.
//!
//! This module provides the error taxonomy, the learner profile model and
//! the preference keys that the storage, course and sync crates agree on.

pub mod error;
pub mod keys;
pub mod profile;

pub use error::{Error, Result};
pub use profile::{Profile, ProfileAccessor, ProfileRequestOptions, ProfileSource};
