//! The long-lived collaborators a [`Dispatcher`] holds for the life of
//! the process, built once at startup and shared (via `Arc`) across every
//! concurrently in-flight request.

use std::sync::Arc;

use relay_crypto::TokenCodec;
use relay_guardrail::{DetectorRegistry, ReverseMap};
use relay_provider::AdapterRegistry;
use relay_router::{CooldownStore, RateLimiter, Router, TokenRefresher};
use relay_state::ConfigStore;
use secrecy::SecretString;

/// Boot-time knobs that don't belong to any single account or tenant:
/// the global proxy key, whether the tenant feature is enabled, and the
/// two auto-switch flags §7 names.
#[derive(Debug, Clone, Default)]
pub struct DispatcherConfig {
    pub tenants_enabled: bool,
    pub guardrails_enabled_default: bool,
    pub request_logging_default: bool,
    pub auto_switch_on_error: bool,
    pub auto_switch_on_rate_limit: bool,
}

impl DispatcherConfig {
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            tenants_enabled: false,
            guardrails_enabled_default: true,
            request_logging_default: false,
            auto_switch_on_error: true,
            auto_switch_on_rate_limit: true,
        }
    }
}

/// The request-dispatch engine. Stateless itself beyond its collaborators:
/// every mutable piece of state (cooldowns, rate-limit windows, the
/// reverse map, round-robin counters, the refresh single-flight table)
/// lives inside the components held here, per §5/§9's "process-wide
/// singleton" ownership model.
pub struct Dispatcher {
    pub(crate) store: Arc<dyn ConfigStore>,
    pub(crate) router: Arc<Router>,
    pub(crate) cooldowns: Arc<CooldownStore>,
    pub(crate) rate_limiter: Arc<RateLimiter>,
    pub(crate) refresher: Arc<TokenRefresher>,
    pub(crate) adapters: Arc<AdapterRegistry>,
    pub(crate) detectors: Arc<DetectorRegistry>,
    pub(crate) guardrail_codec: Arc<TokenCodec>,
    pub(crate) reverse_map: Arc<ReverseMap>,
    pub(crate) proxy_api_key: Option<SecretString>,
    pub(crate) config: DispatcherConfig,
}

impl Dispatcher {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn ConfigStore>,
        router: Arc<Router>,
        cooldowns: Arc<CooldownStore>,
        rate_limiter: Arc<RateLimiter>,
        refresher: Arc<TokenRefresher>,
        adapters: Arc<AdapterRegistry>,
        detectors: Arc<DetectorRegistry>,
        guardrail_codec: Arc<TokenCodec>,
        reverse_map: Arc<ReverseMap>,
        proxy_api_key: Option<SecretString>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            router,
            cooldowns,
            rate_limiter,
            refresher,
            adapters,
            detectors,
            guardrail_codec,
            reverse_map,
            proxy_api_key,
            config,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }
}
