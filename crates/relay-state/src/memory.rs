use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use relay_core::{Account, AccountId, ConfigId, ModelLimits, RequestLogRecord, RoutingConfig, Tenant, TenantId, TierBinding, UsageRecord};

use crate::error::StateError;
use crate::store::ConfigStore;

/// Process-local, non-persistent [`ConfigStore`]. Used in tests and for
/// single-node deployments that don't need the SQLite backend's
/// durability.
#[derive(Default)]
pub struct InMemoryConfigStore {
    accounts: RwLock<HashMap<String, Account>>,
    configs: RwLock<HashMap<String, RoutingConfig>>,
    tier_bindings: RwLock<Vec<TierBinding>>,
    tenants: RwLock<HashMap<String, Tenant>>,
    model_limits: RwLock<Vec<ModelLimits>>,
    usage: RwLock<Vec<UsageRecord>>,
    request_log: RwLock<Vec<RequestLogRecord>>,
}

impl InMemoryConfigStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_model_limits(self, limits: Vec<ModelLimits>) -> Self {
        *self.model_limits.write().expect("lock poisoned") = limits;
        self
    }

    #[must_use]
    pub fn with_configs(self, configs: Vec<RoutingConfig>) -> Self {
        let mut map = self.configs.write().expect("lock poisoned");
        for config in configs {
            map.insert(config.id.as_str().to_owned(), config);
        }
        drop(map);
        self
    }

    #[must_use]
    pub fn with_tier_bindings(self, bindings: Vec<TierBinding>) -> Self {
        self.tier_bindings.write().expect("lock poisoned").extend(bindings);
        self
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn get_account(&self, id: &AccountId) -> Result<Option<Account>, StateError> {
        Ok(self.accounts.read().expect("lock poisoned").get(id.as_str()).cloned())
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, StateError> {
        Ok(self.accounts.read().expect("lock poisoned").values().cloned().collect())
    }

    async fn upsert_account(&self, account: &Account) -> Result<(), StateError> {
        self.accounts
            .write()
            .expect("lock poisoned")
            .insert(account.id.as_str().to_owned(), account.clone());
        Ok(())
    }

    async fn get_active_config(&self) -> Result<Option<RoutingConfig>, StateError> {
        Ok(self.configs.read().expect("lock poisoned").values().find(|c| c.active).cloned())
    }

    async fn get_config(&self, id: &ConfigId) -> Result<Option<RoutingConfig>, StateError> {
        Ok(self.configs.read().expect("lock poisoned").get(id.as_str()).cloned())
    }

    async fn list_tier_bindings(&self, config_id: &ConfigId) -> Result<Vec<TierBinding>, StateError> {
        Ok(self
            .tier_bindings
            .read()
            .expect("lock poisoned")
            .iter()
            .filter(|b| &b.config_id == config_id)
            .cloned()
            .collect())
    }

    async fn get_tenant(&self, id: &TenantId) -> Result<Option<Tenant>, StateError> {
        Ok(self.tenants.read().expect("lock poisoned").get(id.as_str()).cloned())
    }

    async fn get_tenant_by_key_hash(&self, hash: [u8; 32]) -> Result<Option<Tenant>, StateError> {
        Ok(self
            .tenants
            .read()
            .expect("lock poisoned")
            .values()
            .find(|t| t.key_hash == hash)
            .cloned())
    }

    async fn model_limits(&self) -> Result<Vec<ModelLimits>, StateError> {
        Ok(self.model_limits.read().expect("lock poisoned").clone())
    }

    async fn monthly_spend_usd(&self, account_id: &AccountId) -> Result<f64, StateError> {
        let now = Utc::now();
        Ok(self
            .usage
            .read()
            .expect("lock poisoned")
            .iter()
            .filter(|r| &r.account_id == account_id && r.created_at.year() == now.year() && r.created_at.month() == now.month())
            .map(|r| r.cost_usd)
            .sum())
    }

    async fn record_usage(&self, record: &UsageRecord) -> Result<(), StateError> {
        self.usage.write().expect("lock poisoned").push(record.clone());
        Ok(())
    }

    async fn append_request_log(&self, record: &RequestLogRecord) -> Result<(), StateError> {
        self.request_log.write().expect("lock poisoned").push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use relay_core::{AccountStatus, AuthKind, ProviderKind};
    use secrecy::SecretString;

    fn account(id: &str) -> Account {
        Account {
            id: id.into(),
            name: id.to_owned(),
            provider: ProviderKind::Anthropic,
            auth: AuthKind::ApiKey,
            credential: SecretString::new("tok".into()),
            refresh: None,
            expires_at: None,
            base_url: None,
            priority: 0,
            rpm_cap: 0,
            monthly_budget_usd: None,
            enabled: true,
            status: AccountStatus::Active,
            error_count: 0,
            last_used_at: None,
            chatgpt_account_id: None,
        }
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let store = InMemoryConfigStore::new();
        store.upsert_account(&account("a1")).await.unwrap();
        let fetched = store.get_account(&"a1".into()).await.unwrap();
        assert_eq!(fetched.unwrap().id.as_str(), "a1");
    }

    #[tokio::test]
    async fn monthly_spend_sums_current_month_only() {
        let store = InMemoryConfigStore::new();
        let now = Utc::now();
        store
            .record_usage(&UsageRecord {
                account_id: "a1".into(),
                config_id: None,
                tenant_id: None,
                tier: None,
                original_model: "claude-3-5-sonnet".into(),
                routed_model: "claude-3-5-sonnet".into(),
                input_tokens: 10,
                output_tokens: 20,
                cache_read_tokens: 0,
                cache_write_tokens: 0,
                cost_usd: 1.5,
                created_at: now,
            })
            .await
            .unwrap();
        store
            .record_usage(&UsageRecord {
                account_id: "a1".into(),
                config_id: None,
                tenant_id: None,
                tier: None,
                original_model: "claude-3-5-sonnet".into(),
                routed_model: "claude-3-5-sonnet".into(),
                input_tokens: 10,
                output_tokens: 20,
                cache_read_tokens: 0,
                cache_write_tokens: 0,
                cost_usd: 2.5,
                created_at: now - Duration::days(40),
            })
            .await
            .unwrap();

        let spend = store.monthly_spend_usd(&"a1".into()).await.unwrap();
        assert!((spend - 1.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn list_oauth_accounts_filters_by_auth_kind() {
        let store = InMemoryConfigStore::new();
        let mut oauth = account("a1");
        oauth.auth = AuthKind::OAuth;
        store.upsert_account(&oauth).await.unwrap();
        store.upsert_account(&account("a2")).await.unwrap();

        let oauth_accounts = store.list_oauth_accounts().await.unwrap();
        assert_eq!(oauth_accounts.len(), 1);
        assert_eq!(oauth_accounts[0].id.as_str(), "a1");
    }
}
