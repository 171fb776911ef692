//! Inbound API key resolution: global proxy key, then tenant lookup by
//! key hash, per spec §4.H step 1.

use relay_state::ConfigStore;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::DispatchError;

#[must_use]
pub fn hash_key(raw: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hasher.finalize().into()
}

fn constant_time_matches(candidate: &str, secret: &SecretString) -> bool {
    let expected = secret.expose_secret().as_bytes();
    let actual = candidate.as_bytes();
    actual.len() == expected.len() && bool::from(actual.ct_eq(expected))
}

/// Resolve `api_key` to an optional tenant. `None` means the request is
/// accepted without tenant scoping (global-key match, or no tenant
/// feature and no global key configured at all).
///
/// # Errors
/// Returns [`DispatchError::Unauthorized`] when a key is required and
/// missing, unrecognised, or belongs to a disabled tenant.
pub async fn authenticate(
    store: &dyn ConfigStore,
    api_key: Option<&str>,
    proxy_api_key: Option<&SecretString>,
    tenants_enabled: bool,
) -> Result<Option<relay_core::Tenant>, DispatchError> {
    if let (Some(key), Some(proxy_key)) = (api_key, proxy_api_key) {
        if constant_time_matches(key, proxy_key) {
            return Ok(None);
        }
    }

    if tenants_enabled {
        let Some(key) = api_key else {
            return Err(DispatchError::Unauthorized("missing api key".to_owned()));
        };
        let hash = hash_key(key);
        let tenant = store
            .get_tenant_by_key_hash(hash)
            .await
            .map_err(|e| DispatchError::Internal(e.to_string()))?;
        return match tenant {
            Some(t) if t.enabled => Ok(Some(t)),
            _ => Err(DispatchError::Unauthorized("unknown api key".to_owned())),
        };
    }

    if proxy_api_key.is_some() {
        return Err(DispatchError::Unauthorized("invalid api key".to_owned()));
    }

    Ok(None)
}

/// Extract the raw key from either `x-api-key` or a `Bearer` `authorization`
/// header, whichever is present. `x-api-key` wins when both are set.
#[must_use]
pub fn extract_api_key(x_api_key: Option<&str>, authorization: Option<&str>) -> Option<String> {
    if let Some(key) = x_api_key {
        return Some(key.to_owned());
    }
    authorization
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_state::InMemoryConfigStore;

    #[tokio::test]
    async fn global_key_match_bypasses_tenant_lookup() {
        let store = InMemoryConfigStore::new();
        let proxy_key = SecretString::new("proxy-secret".into());
        let tenant = authenticate(&store, Some("proxy-secret"), Some(&proxy_key), true).await.unwrap();
        assert!(tenant.is_none());
    }

    #[tokio::test]
    async fn missing_key_with_global_key_configured_is_rejected() {
        let store = InMemoryConfigStore::new();
        let proxy_key = SecretString::new("proxy-secret".into());
        let err = authenticate(&store, None, Some(&proxy_key), false).await.unwrap_err();
        assert!(matches!(err, DispatchError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn no_global_key_and_no_tenants_is_open() {
        let store = InMemoryConfigStore::new();
        let tenant = authenticate(&store, None, None, false).await.unwrap();
        assert!(tenant.is_none());
    }

    #[tokio::test]
    async fn unknown_key_with_tenants_enabled_is_rejected() {
        let store = InMemoryConfigStore::new();
        let err = authenticate(&store, Some("nope"), None, true).await.unwrap_err();
        assert!(matches!(err, DispatchError::Unauthorized(_)));
    }

    #[test]
    fn extract_prefers_x_api_key() {
        assert_eq!(extract_api_key(Some("a"), Some("Bearer b")), Some("a".to_owned()));
        assert_eq!(extract_api_key(None, Some("Bearer b")), Some("b".to_owned()));
        assert_eq!(extract_api_key(None, Some("Basic xyz")), None);
        assert_eq!(extract_api_key(None, None), None);
    }
}
