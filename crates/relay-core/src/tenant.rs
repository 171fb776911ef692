use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::{ConfigId, TenantId};

/// A named caller identity with its own API key hash, optional pinned
/// routing config, and optional per-tenant rate cap. Only consulted when
/// the global tenant feature flag is enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub display_name: String,
    /// SHA-256 of the raw tenant API key.
    pub key_hash: [u8; 32],
    pub pinned_config_id: Option<ConfigId>,
    pub rate_cap: Option<u32>,
    #[serde(default)]
    pub settings: HashMap<String, serde_json::Value>,
    pub enabled: bool,
}

impl Tenant {
    /// The rate-limiter key for this tenant, namespaced so it never
    /// collides with a bare account id (invariant 3, data model).
    #[must_use]
    pub fn rate_limit_key(&self) -> String {
        format!("tenant:{}", self.id)
    }

    /// Resolve a boolean setting with a fallback default, used for
    /// tenant-scoped feature flags such as `guardrails_enabled`.
    #[must_use]
    pub fn setting_bool(&self, key: &str, default: bool) -> bool {
        self.settings
            .get(key)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(default)
    }
}
