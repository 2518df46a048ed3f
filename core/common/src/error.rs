//! Common error types for coursesync.

use thiserror::Error;

/// Top-level error type for coursesync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Request never produced a response (DNS, connect, timeout).
    #[error("Network error: {0}")]
    Network(String),

    /// Remote answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Key/value or preference store failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Local database failed.
    #[error("Database error: {0}")]
    Database(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Platform feature is missing on this device.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A background step aborted unexpectedly.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the failure is expected to clear up on its own, so the next
    /// periodic attempt has a reasonable chance to succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Network(_) | Error::Database(_) | Error::Io(_) => true,
            Error::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::Network("reset".into()).is_transient());
        assert!(Error::Database("busy".into()).is_transient());
        assert!(Error::Http { status: 503, body: String::new() }.is_transient());
        assert!(Error::Http { status: 429, body: String::new() }.is_transient());
        assert!(!Error::Http { status: 400, body: String::new() }.is_transient());
        assert!(!Error::Serialization("bad".into()).is_transient());
    }

    #[test]
    fn test_json_error_conversion() {
        let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
