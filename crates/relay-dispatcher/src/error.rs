use relay_core::ApiErrorKind;
use thiserror::Error;

/// Every way a dispatch can end without a successful upstream response.
/// Carries enough to render either wire envelope shape: `relay-server`
/// maps this onto the OpenAI or Anthropic error JSON depending on how the
/// request arrived.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("no healthy account available for this model")]
    Overloaded,

    #[error("rate limit exceeded")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Every candidate was exhausted; carries the last non-2xx status the
    /// final candidate returned, if any attempt got as far as a response.
    #[error("all upstream candidates failed")]
    AllCandidatesFailed { last_status: Option<u16> },

    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    #[must_use]
    pub fn kind(&self) -> ApiErrorKind {
        match self {
            Self::Unauthorized(_) => ApiErrorKind::Authentication,
            Self::InvalidRequest(_) => ApiErrorKind::InvalidRequest,
            Self::Overloaded | Self::AllCandidatesFailed { .. } => ApiErrorKind::Overloaded,
            Self::RateLimited { .. } => ApiErrorKind::RateLimit,
            Self::Upstream { status, .. } => ApiErrorKind::from_status(*status),
            Self::Internal(_) => ApiErrorKind::ApiError,
        }
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::Upstream { status, .. } => *status,
            other => other.kind().default_status(),
        }
    }

    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => *retry_after_secs,
            _ => None,
        }
    }
}
