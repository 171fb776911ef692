use async_trait::async_trait;
use bytes::Bytes;
use relay_core::Account;
use secrecy::ExposeSecret;

use crate::adapter::ProviderAdapter;
use crate::error::ProviderError;
use crate::response::ProviderResponse;
use crate::send::send_and_wrap;

const CODEX_URL: &str = "https://chatgpt.com/backend-api/codex/responses";
const USER_AGENT: &str = "codex_cli_rs/0.1.0";
const ORIGINATOR: &str = "codex_cli_rs";

/// Speaks the Codex-subscription `Responses` API. `body` must already be
/// in Responses shape -- the `relay-convert` Codex bridge produces it from
/// the normalised Chat Completions request before this adapter is called.
/// Requires `chatgpt_account_id` on the account; the adapter has nothing
/// sensible to send without it.
pub struct CodexSubAdapter {
    client: reqwest::Client,
}

impl CodexSubAdapter {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProviderAdapter for CodexSubAdapter {
    fn name(&self) -> &'static str {
        "codex-sub"
    }

    async fn forward(&self, account: &Account, body: Bytes, is_stream: bool) -> Result<ProviderResponse, ProviderError> {
        let account_id = account
            .chatgpt_account_id
            .as_deref()
            .ok_or_else(|| ProviderError::Configuration("codex-sub account missing chatgpt_account_id".to_owned()))?;

        let request = self
            .client
            .post(CODEX_URL)
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", account.credential.expose_secret()))
            .header("chatgpt-account-id", account_id)
            .header("user-agent", USER_AGENT)
            .header("originator", ORIGINATOR)
            .body(body);

        send_and_wrap(request, is_stream).await
    }
}
