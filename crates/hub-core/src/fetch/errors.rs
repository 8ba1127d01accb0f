use thiserror::Error;

/// Failure of a single request to a single node.
///
/// Messages are sanitized at construction; raw transport errors never leak
/// upstream hostnames or bodies into logs or client responses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("request canceled")]
    Canceled,

    #[error("no results")]
    NoResult,

    #[error("HTTP {0}: {1}")]
    Status(u16, String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    /// Whether the fetcher should try the same node again.
    ///
    /// Timeouts, cancellation and an explicit "no results" are final answers,
    /// retrying them only delays the fan-out.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Status(..) | Self::Transport(_))
    }

    #[must_use]
    pub fn is_no_result(&self) -> bool {
        matches!(self, Self::NoResult)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_errors_are_not_retryable() {
        assert!(!FetchError::Timeout.is_retryable());
        assert!(!FetchError::Canceled.is_retryable());
        assert!(!FetchError::NoResult.is_retryable());
        assert!(!FetchError::InvalidPayload("x".into()).is_retryable());
    }

    #[test]
    fn transient_errors_are_retryable() {
        assert!(FetchError::Status(502, "bad gateway".into()).is_retryable());
        assert!(FetchError::Transport("connection refused or unreachable".into()).is_retryable());
    }
}
