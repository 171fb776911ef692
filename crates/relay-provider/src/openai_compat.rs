use async_trait::async_trait;
use bytes::Bytes;
use relay_core::Account;
use secrecy::ExposeSecret;

use crate::adapter::ProviderAdapter;
use crate::error::ProviderError;
use crate::response::ProviderResponse;
use crate::send::send_and_wrap;
use crate::url::build_chat_completions_url;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Covers both the native OpenAI API and the OpenAI-compatible
/// chat-completions dialect spoken by DeepSeek, GLM, Cerebras, Gemini (via
/// its OpenAI compatibility layer), MiniMax and OpenRouter. The only
/// per-account knob is `base_url`; all of them authenticate with a bearer
/// token.
pub struct OpenAiCompatAdapter {
    client: reqwest::Client,
}

impl OpenAiCompatAdapter {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatAdapter {
    fn name(&self) -> &'static str {
        "openai-compat"
    }

    async fn forward(&self, account: &Account, body: Bytes, is_stream: bool) -> Result<ProviderResponse, ProviderError> {
        let base = account.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let url = build_chat_completions_url(base);

        let request = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", account.credential.expose_secret()))
            .body(body);

        send_and_wrap(request, is_stream).await
    }
}
