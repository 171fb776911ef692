use async_trait::async_trait;
use bytes::Bytes;
use relay_core::Account;
use secrecy::ExposeSecret;

use crate::adapter::ProviderAdapter;
use crate::error::ProviderError;
use crate::response::ProviderResponse;
use crate::send::send_and_wrap;

/// Raw pass-through for upstreams that don't fit the other three
/// personalities: `base_url` is used verbatim as the full endpoint, with
/// no path adjustment. Authenticates with a bearer token, the convention
/// the large majority of custom OpenAI-shaped endpoints follow.
pub struct CustomAdapter {
    client: reqwest::Client,
}

impl CustomAdapter {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProviderAdapter for CustomAdapter {
    fn name(&self) -> &'static str {
        "custom"
    }

    async fn forward(&self, account: &Account, body: Bytes, is_stream: bool) -> Result<ProviderResponse, ProviderError> {
        let url = account
            .base_url
            .clone()
            .ok_or_else(|| ProviderError::Configuration("custom account missing base_url".to_owned()))?;

        let request = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", account.credential.expose_secret()))
            .body(body);

        send_and_wrap(request, is_stream).await
    }
}
