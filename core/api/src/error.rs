//! API error types.

use thiserror::Error;

/// Failure of a single API call.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// No response was received.
    #[error("Network failure: {0}")]
    Network(String),

    /// The server answered with a non-2xx status.
    #[error("Server responded {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body did not have the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The request description itself is invalid.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<ApiError> for coursesync_common::Error {
    fn from(err: ApiError) -> Self {
        use coursesync_common::Error;

        match err {
            ApiError::Network(msg) => Error::Network(msg),
            ApiError::Status { status, body } => Error::Http { status, body },
            ApiError::Decode(msg) => Error::Serialization(msg),
            ApiError::InvalidRequest(msg) => Error::InvalidInput(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursesync_common::Error;

    #[test]
    fn test_status_maps_to_http_error() {
        let err: Error = ApiError::Status {
            status: 502,
            body: "bad gateway".into(),
        }
        .into();
        assert!(matches!(err, Error::Http { status: 502, .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn test_network_maps_to_network_error() {
        let err: Error = ApiError::Network("refused".into()).into();
        assert!(matches!(err, Error::Network(_)));
    }
}
