use async_trait::async_trait;
use bytes::Bytes;
use relay_core::Account;

use crate::error::ProviderError;
use crate::response::ProviderResponse;

/// Four upstream personalities share this capability: forward an
/// already wire-shaped request body and return a normalised response
/// handle. `body` is expected to already be in the dialect the upstream
/// speaks (Anthropic Messages JSON, OpenAI Chat Completions JSON, or
/// Codex Responses JSON) -- conversion happens one layer up, in
/// `relay-convert`.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn forward(&self, account: &Account, body: Bytes, is_stream: bool) -> Result<ProviderResponse, ProviderError>;
}
