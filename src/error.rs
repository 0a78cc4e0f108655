//! Request-level error taxonomy.
//!
//! Every failure a chat or model request can end with. Upstream failures that
//! are recovered inside the failover loop never reach this type; only the
//! ones surfaced to the client do.

use thiserror::Error;

use crate::models::ModelLookupError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Service unavailable: Client API keys not configured on server.")]
    KeysNotConfigured,

    #[error("API key required in Authorization header.")]
    MissingApiKey,

    #[error("Invalid client API key.")]
    InvalidApiKey,

    #[error("Invalid request body: {0}")]
    InvalidRequest(String),

    #[error("No messages provided in the request.")]
    EmptyMessages,

    #[error(transparent)]
    ModelNotFound(#[from] ModelLookupError),

    #[error("No valid Yupp.ai accounts available.")]
    NoAccountAvailable,

    #[error("All attempts to contact Yupp.ai API failed.")]
    AttemptsExhausted,

    /// Upstream rejected the request itself; passed through unchanged.
    #[error("{body}")]
    UpstreamClient { status: u16, body: String },

    #[error("Stream decoding failed: {0}")]
    Decode(String),
}

impl GatewayError {
    /// HTTP status code this error is surfaced with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::KeysNotConfigured => 503,
            Self::MissingApiKey => 401,
            Self::InvalidApiKey => 403,
            Self::InvalidRequest(_) | Self::EmptyMessages => 400,
            Self::ModelNotFound(_) => 404,
            Self::NoAccountAvailable | Self::AttemptsExhausted => 503,
            Self::UpstreamClient { status, .. } => *status,
            Self::Decode(_) => 500,
        }
    }

    /// OpenAI-style error type string.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::KeysNotConfigured | Self::NoAccountAvailable | Self::AttemptsExhausted => {
                "service_unavailable"
            }
            Self::MissingApiKey | Self::InvalidApiKey => "authentication_error",
            Self::InvalidRequest(_) | Self::EmptyMessages => "invalid_request_error",
            Self::ModelNotFound(_) => "model_not_found",
            Self::UpstreamClient { .. } => "yupp_api_error",
            Self::Decode(_) => "decode_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(GatewayError::KeysNotConfigured.status_code(), 503);
        assert_eq!(GatewayError::MissingApiKey.status_code(), 401);
        assert_eq!(GatewayError::InvalidApiKey.status_code(), 403);
        assert_eq!(GatewayError::NoAccountAvailable.status_code(), 503);
        assert_eq!(
            GatewayError::ModelNotFound(ModelLookupError::Unknown("x".into())).status_code(),
            404
        );
    }

    #[test]
    fn upstream_client_failure_keeps_status_and_body() {
        let err = GatewayError::UpstreamClient {
            status: 422,
            body: "bad prompt".to_string(),
        };
        assert_eq!(err.status_code(), 422);
        assert_eq!(err.to_string(), "bad prompt");
    }
}
