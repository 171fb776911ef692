use thiserror::Error;

/// Errors a [`crate::ProviderAdapter`] can raise. These cover only
/// local/transport failures -- a non-2xx upstream response is not an
/// error here, it comes back as a [`crate::ProviderResponse`] with the
/// matching status so the dispatcher can apply cooldown/retry policy.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("invalid adapter configuration: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err.to_string())
        }
    }
}
