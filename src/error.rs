//! Error types for the request orchestration layer
//!
//! Provides unified error handling using thiserror, including the
//! retryable/non-retryable classification the dispatch loop relies on.

use std::sync::Arc;

use thiserror::Error;

// == Fetch Error Enum ==
/// Unified error type for cache and orchestration operations.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Attempt exceeded its per-attempt timeout
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// Transport-level failure (DNS, connection reset, TLS)
    #[error("network error: {0}")]
    Network(String),

    /// HTTP 4xx response
    #[error("client error: status {status}")]
    ClientError { status: u16 },

    /// HTTP 5xx response
    #[error("server error: status {status}")]
    ServerError { status: u16 },

    /// Caller-initiated cancellation
    #[error("request cancelled")]
    Cancelled,

    /// Stored entry could not be decoded; handled internally as a miss
    #[error("corrupted cache entry: {0}")]
    CacheCorruption(String),

    /// Invalid request or cache input
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Failure shared from another caller's in-flight fetch on the same key
    #[error("{0}")]
    Shared(Arc<FetchError>),

    /// Internal invariant violation
    #[error("internal error: {0}")]
    Internal(String),
}

impl FetchError {
    // == Status Classification ==
    /// Maps an HTTP status code to an error, or `None` for a success status.
    ///
    /// Anything below 400 counts as success; 4xx maps to `ClientError` and
    /// 5xx (or any other out-of-range code) to `ServerError`.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            0..=399 => None,
            400..=499 => Some(FetchError::ClientError { status }),
            _ => Some(FetchError::ServerError { status }),
        }
    }

    // == Retryability ==
    /// Whether the dispatch loop may retry after this error.
    ///
    /// Timeouts, transport failures and 5xx responses are transient. 4xx
    /// responses fail fast, except 408 (request timeout) and 429 (too many
    /// requests) which behave like transient faults. Cancellation is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout(_) | FetchError::Network(_) | FetchError::ServerError { .. } => {
                true
            }
            FetchError::ClientError { status } => matches!(status, 408 | 429),
            FetchError::Shared(inner) => inner.is_retryable(),
            FetchError::Cancelled
            | FetchError::CacheCorruption(_)
            | FetchError::InvalidRequest(_)
            | FetchError::Internal(_) => false,
        }
    }

    /// Whether this error was produced by caller-initiated cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            FetchError::Cancelled => true,
            FetchError::Shared(inner) => inner.is_cancelled(),
            _ => false,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the orchestration layer.
pub type Result<T> = std::result::Result<T, FetchError>;

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_statuses_do_not_classify() {
        assert!(FetchError::from_status(200).is_none());
        assert!(FetchError::from_status(204).is_none());
        assert!(FetchError::from_status(304).is_none());
        assert!(FetchError::from_status(399).is_none());
    }

    #[test]
    fn test_client_error_classification() {
        for status in [400, 401, 403, 404] {
            match FetchError::from_status(status) {
                Some(FetchError::ClientError { status: s }) => assert_eq!(s, status),
                other => panic!("expected ClientError for {status}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_server_error_classification() {
        match FetchError::from_status(503) {
            Some(FetchError::ServerError { status }) => assert_eq!(status, 503),
            other => panic!("expected ServerError, got {other:?}"),
        }
    }

    #[test]
    fn test_retryability() {
        assert!(FetchError::Timeout(5000).is_retryable());
        assert!(FetchError::Network("connection reset".into()).is_retryable());
        assert!(FetchError::ServerError { status: 500 }.is_retryable());
        assert!(FetchError::ClientError { status: 429 }.is_retryable());
        assert!(FetchError::ClientError { status: 408 }.is_retryable());

        assert!(!FetchError::ClientError { status: 404 }.is_retryable());
        assert!(!FetchError::ClientError { status: 401 }.is_retryable());
        assert!(!FetchError::Cancelled.is_retryable());
        assert!(!FetchError::CacheCorruption("bad block".into()).is_retryable());
        assert!(!FetchError::InvalidRequest("empty key".into()).is_retryable());
    }

    #[test]
    fn test_shared_error_forwards_classification() {
        let shared = FetchError::Shared(Arc::new(FetchError::ServerError { status: 502 }));
        assert!(shared.is_retryable());

        let shared = FetchError::Shared(Arc::new(FetchError::Cancelled));
        assert!(!shared.is_retryable());
        assert!(shared.is_cancelled());
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            FetchError::Timeout(5000).to_string(),
            "request timed out after 5000 ms"
        );
        assert_eq!(
            FetchError::ClientError { status: 404 }.to_string(),
            "client error: status 404"
        );
    }
}
