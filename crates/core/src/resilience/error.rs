use std::fmt;
use thiserror::Error;

/// Operation exceeded its time budget. The racing future is dropped on
/// expiry, which aborts in-flight reqwest requests; operations without a
/// real cancellation path keep running detached until they resolve.
#[derive(Debug, Error)]
#[error("{label} timed out after {timeout_ms}ms")]
pub struct TimeoutError {
    pub label: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Error)]
#[error("circuit breaker '{name}' is open; failing fast")]
pub struct CircuitOpenError {
    pub name: String,
}

/// Non-2xx HTTP response. Kept typed so retry conditions can classify by
/// status class instead of string-matching error messages.
#[derive(Debug, Error)]
#[error("HTTP {status}: {body}")]
pub struct HttpStatusError {
    pub status: u16,
    pub body: String,
}

impl HttpStatusError {
    pub fn new(status: reqwest::StatusCode, body: impl Into<String>) -> Self {
        Self {
            status: status.as_u16(),
            body: body.into(),
        }
    }
}

#[derive(Debug)]
pub struct RetryExhaustedError {
    pub attempts: u32,
    pub last_error: anyhow::Error,
}

impl fmt::Display for RetryExhaustedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "operation failed after {} attempts: {:#}",
            self.attempts, self.last_error
        )
    }
}

impl std::error::Error for RetryExhaustedError {}

/// Default retry condition: transient network/provider conditions only.
/// An open breaker is explicitly non-retryable; retrying against it burns
/// the retry budget without touching the network.
pub fn is_transient(err: &anyhow::Error) -> bool {
    if err.downcast_ref::<CircuitOpenError>().is_some() {
        return false;
    }
    if err.downcast_ref::<TimeoutError>().is_some() {
        return true;
    }
    if let Some(http) = err.downcast_ref::<HttpStatusError>() {
        return http.status == 429 || http.status >= 500;
    }
    if let Some(req) = err.downcast_ref::<reqwest::Error>() {
        return req.is_timeout() || req.is_connect();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_breaker_is_not_transient() {
        let err: anyhow::Error = CircuitOpenError {
            name: "anthropic".to_string(),
        }
        .into();
        assert!(!is_transient(&err));
    }

    #[test]
    fn timeout_is_transient_even_under_context() {
        let err: anyhow::Error = TimeoutError {
            label: "quote".to_string(),
            timeout_ms: 1000,
        }
        .into();
        let err = err.context("fetching index price");
        assert!(is_transient(&err));
    }

    #[test]
    fn http_status_classification() {
        let rate_limited: anyhow::Error = HttpStatusError {
            status: 429,
            body: "quota".to_string(),
        }
        .into();
        let server: anyhow::Error = HttpStatusError {
            status: 503,
            body: "unavailable".to_string(),
        }
        .into();
        let client: anyhow::Error = HttpStatusError {
            status: 404,
            body: "missing".to_string(),
        }
        .into();

        assert!(is_transient(&rate_limited));
        assert!(is_transient(&server));
        assert!(!is_transient(&client));
    }
}
