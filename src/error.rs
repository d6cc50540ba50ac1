//! Error types for the HTTP and push boundaries

use thiserror::Error;

/// Errors surfaced by API operations.
///
/// Mutation flows treat every variant the same way (roll back); read flows
/// keep showing the last known state.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No connectivity, DNS failure, timeout, TLS failure
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered 401; the session has been invalidated
    #[error("Session expired. Please login again.")]
    SessionExpired,

    /// No identity is open, so there is no bearer token to send
    #[error("not logged in")]
    NotAuthenticated,

    /// Non-success HTTP status
    #[error("request failed ({status}): {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Server-provided message, or a generic fallback
        message: String,
    },

    /// The body could not be decoded or lacked an expected field
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ApiError {
    /// Whether this error came from an expired session
    pub const fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Result alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_expired_message() {
        let err = ApiError::SessionExpired;
        assert!(err.is_session_expired());
        assert_eq!(err.to_string(), "Session expired. Please login again.");
    }

    #[test]
    fn test_json_error_is_malformed() {
        let err: ApiError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, ApiError::Malformed(_)));
    }
}
