use async_trait::async_trait;
use bytes::Bytes;
use relay_core::{Account, AuthKind};
use secrecy::ExposeSecret;

use crate::adapter::ProviderAdapter;
use crate::error::ProviderError;
use crate::response::ProviderResponse;
use crate::send::send_and_wrap;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const OAUTH_BETA_FLAGS: &str = "oauth-2025-04-20,claude-code-20250219";

/// Speaks the native Anthropic Messages API. API-key accounts authenticate
/// with `x-api-key`; OAuth accounts use `Authorization: Bearer` plus the
/// two mandatory beta flags and the direct-browser-access header Anthropic
/// requires from OAuth-authenticated clients.
pub struct AnthropicAdapter {
    client: reqwest::Client,
}

impl AnthropicAdapter {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn forward(&self, account: &Account, body: Bytes, is_stream: bool) -> Result<ProviderResponse, ProviderError> {
        let base = account.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let url = format!("{}/v1/messages", base.trim_end_matches('/'));

        let mut request = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .header("anthropic-version", ANTHROPIC_VERSION)
            .body(body);

        request = match account.auth {
            AuthKind::ApiKey => request.header("x-api-key", account.credential.expose_secret()),
            AuthKind::OAuth => request
                .header("authorization", format!("Bearer {}", account.credential.expose_secret()))
                .header("anthropic-beta", OAUTH_BETA_FLAGS)
                .header("anthropic-dangerous-direct-browser-access", "true"),
        };

        send_and_wrap(request, is_stream).await
    }
}
