use std::sync::Arc;
use std::time::Duration;

use relay_core::ProviderKind;

use crate::adapter::ProviderAdapter;
use crate::anthropic::AnthropicAdapter;
use crate::codex::CodexSubAdapter;
use crate::custom::CustomAdapter;
use crate::error::ProviderError;
use crate::openai_compat::OpenAiCompatAdapter;

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Builds the one adapter instance per personality, shared across every
/// request. `ProviderKind::Openai` and `ProviderKind::OpenaiCompat` speak
/// the identical wire dialect and differ only in default base URL, which
/// lives on the `Account`, so both route to [`OpenAiCompatAdapter`].
pub struct AdapterRegistry {
    anthropic: Arc<AnthropicAdapter>,
    openai_compat: Arc<OpenAiCompatAdapter>,
    codex_sub: Arc<CodexSubAdapter>,
    custom: Arc<CustomAdapter>,
}

impl AdapterRegistry {
    /// # Errors
    /// Returns an error if the shared HTTP client fails to build.
    pub fn new() -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;

        Ok(Self {
            anthropic: Arc::new(AnthropicAdapter::new(client.clone())),
            openai_compat: Arc::new(OpenAiCompatAdapter::new(client.clone())),
            codex_sub: Arc::new(CodexSubAdapter::new(client.clone())),
            custom: Arc::new(CustomAdapter::new(client)),
        })
    }

    #[must_use]
    pub fn for_kind(&self, kind: ProviderKind) -> Arc<dyn ProviderAdapter> {
        match kind {
            ProviderKind::Anthropic => self.anthropic.clone(),
            ProviderKind::Openai | ProviderKind::OpenaiCompat => self.openai_compat.clone(),
            ProviderKind::CodexSub => self.codex_sub.clone(),
            ProviderKind::Custom => self.custom.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_and_openai_compat_share_adapter() {
        let registry = AdapterRegistry::new().unwrap();
        assert_eq!(registry.for_kind(ProviderKind::Openai).name(), registry.for_kind(ProviderKind::OpenaiCompat).name());
    }

    #[test]
    fn each_kind_resolves_to_expected_name() {
        let registry = AdapterRegistry::new().unwrap();
        assert_eq!(registry.for_kind(ProviderKind::Anthropic).name(), "anthropic");
        assert_eq!(registry.for_kind(ProviderKind::CodexSub).name(), "codex-sub");
        assert_eq!(registry.for_kind(ProviderKind::Custom).name(), "custom");
    }
}
