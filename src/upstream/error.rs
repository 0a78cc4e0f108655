//! Upstream error types with failover classification.
//!
//! Every failed attempt maps onto an [`AccountOutcome`], which decides
//! whether the gateway retries with another account or gives up.

use thiserror::Error;

use crate::account_pool::AccountOutcome;

/// Error from calls to the upstream service.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Non-2xx response. `body` is the response text, as returned.
    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Connection, TLS, timeout or request-building failure.
    #[error("upstream request failed: {0}")]
    Transport(String),

    /// Failure while reading an already accepted response body.
    #[error("upstream stream failed: {0}")]
    Stream(String),

    /// Response arrived but did not have the expected shape.
    #[error("unexpected upstream response: {0}")]
    Parse(String),
}

impl UpstreamError {
    pub fn transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Transport(format!("Request timeout: {}", err))
        } else if err.is_connect() {
            Self::Transport(format!("Connection failed: {}", err))
        } else {
            Self::Transport(format!("Request failed: {}", err))
        }
    }

    /// How this failure counts against the account that made the attempt.
    pub fn outcome(&self) -> AccountOutcome {
        match self {
            Self::Status { status, .. } => classify_http_status(*status),
            Self::Transport(_) | Self::Stream(_) | Self::Parse(_) => {
                AccountOutcome::TransientFailure
            }
        }
    }
}

/// Parse HTTP status code into an account outcome.
pub fn classify_http_status(status: u16) -> AccountOutcome {
    match status {
        200..=299 => AccountOutcome::Success,
        401 | 403 => AccountOutcome::AuthFailure,
        429 | 500 | 502 | 503 | 504 => AccountOutcome::TransientFailure,
        _ => AccountOutcome::ClientFailure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_classification() {
        assert_eq!(classify_http_status(200), AccountOutcome::Success);
        assert_eq!(classify_http_status(401), AccountOutcome::AuthFailure);
        assert_eq!(classify_http_status(403), AccountOutcome::AuthFailure);
        assert_eq!(classify_http_status(429), AccountOutcome::TransientFailure);
        assert_eq!(classify_http_status(500), AccountOutcome::TransientFailure);
        assert_eq!(classify_http_status(502), AccountOutcome::TransientFailure);
        assert_eq!(classify_http_status(503), AccountOutcome::TransientFailure);
        assert_eq!(classify_http_status(504), AccountOutcome::TransientFailure);
        assert_eq!(classify_http_status(400), AccountOutcome::ClientFailure);
        assert_eq!(classify_http_status(404), AccountOutcome::ClientFailure);
        assert_eq!(classify_http_status(501), AccountOutcome::ClientFailure);
    }

    #[test]
    fn test_non_status_errors_are_transient() {
        assert_eq!(
            UpstreamError::Transport("reset".into()).outcome(),
            AccountOutcome::TransientFailure
        );
        assert_eq!(
            UpstreamError::Stream("eof".into()).outcome(),
            AccountOutcome::TransientFailure
        );
        assert_eq!(
            UpstreamError::Status {
                status: 403,
                body: String::new()
            }
            .outcome(),
            AccountOutcome::AuthFailure
        );
    }
}
