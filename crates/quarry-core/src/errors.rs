use std::time::Duration;

/// Typed error hierarchy for chat-completion providers.
/// Classifies errors as fatal (don't retry), retryable, or operational.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ProviderError {
    // Fatal — don't retry
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    // Retryable
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("provider overloaded")]
    ProviderOverloaded,
    #[error("network error: {0}")]
    NetworkError(String),

    // Operational
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::ServerError { .. }
                | Self::ProviderOverloaded
                | Self::NetworkError(_)
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthenticationFailed(_) | Self::InvalidRequest(_))
    }

    pub fn suggested_delay(&self) -> Option<Duration> {
        if let Self::RateLimited { retry_after } = self {
            *retry_after
        } else {
            None
        }
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::RateLimited { .. } => "rate_limited",
            Self::ServerError { .. } => "server_error",
            Self::ProviderOverloaded => "provider_overloaded",
            Self::NetworkError(_) => "network_error",
            Self::Timeout(_) => "timeout",
            Self::MalformedResponse(_) => "malformed_response",
        }
    }

    /// Classify an HTTP status code into the appropriate error variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(body),
            400 => Self::InvalidRequest(body),
            429 => Self::RateLimited { retry_after: None },
            529 => Self::ProviderOverloaded,
            500..=599 => Self::ServerError { status, body },
            _ => Self::InvalidRequest(format!("unexpected status {status}: {body}")),
        }
    }
}
