//! Error taxonomy for paginated queries.

use quakefeed_core::{CursorError, InvalidRequest};

/// Errors returned by [`QueryEngine::execute`](super::QueryEngine::execute).
///
/// Cursor and request errors are client errors and are never retried.
/// `StoreUnavailable` is transient; the caller decides whether to retry.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    Cursor(#[from] CursorError),
    #[error(transparent)]
    InvalidRequest(#[from] InvalidRequest),
    #[error("event store unavailable: {0}")]
    StoreUnavailable(#[source] anyhow::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl QueryError {
    /// Whether the request itself is at fault.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Cursor(_) | Self::InvalidRequest(_))
    }

    /// Stable machine-readable code for API responses.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Cursor(e) => e.code(),
            Self::InvalidRequest(_) => "invalid_request",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_errors_are_client_errors() {
        let err = QueryError::from(CursorError::InvalidSignature);
        assert!(err.is_client_error());
        assert_eq!(err.code(), "invalid_signature");
        assert_eq!(err.to_string(), "cursor signature does not verify");
    }

    #[test]
    fn store_errors_are_not_client_errors() {
        let err = QueryError::StoreUnavailable(anyhow::anyhow!("connection reset"));
        assert!(!err.is_client_error());
        assert_eq!(err.code(), "store_unavailable");
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn invalid_request_keeps_message() {
        let err = QueryError::from(InvalidRequest("bad window".to_string()));
        assert!(err.is_client_error());
        assert_eq!(err.code(), "invalid_request");
        assert_eq!(err.to_string(), "invalid request: bad window");
    }
}
