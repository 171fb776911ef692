use async_trait::async_trait;
use relay_core::{Account, AccountId, ConfigId, ModelLimits, RequestLogRecord, RoutingConfig, Tenant, TenantId, TierBinding, UsageRecord};

use crate::error::StateError;

/// Everything the router and dispatcher need to read or write durably.
///
/// Implementations must be `Send + Sync`; the dispatcher and background
/// refresh loop hold a single shared instance behind an `Arc` for the
/// life of the process.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get_account(&self, id: &AccountId) -> Result<Option<Account>, StateError>;
    async fn list_accounts(&self) -> Result<Vec<Account>, StateError>;
    async fn list_oauth_accounts(&self) -> Result<Vec<Account>, StateError> {
        Ok(self
            .list_accounts()
            .await?
            .into_iter()
            .filter(|a| a.auth == relay_core::AuthKind::OAuth)
            .collect())
    }
    async fn upsert_account(&self, account: &Account) -> Result<(), StateError>;

    async fn get_active_config(&self) -> Result<Option<RoutingConfig>, StateError>;
    async fn get_config(&self, id: &ConfigId) -> Result<Option<RoutingConfig>, StateError>;
    async fn list_tier_bindings(&self, config_id: &ConfigId) -> Result<Vec<TierBinding>, StateError>;

    async fn get_tenant(&self, id: &TenantId) -> Result<Option<Tenant>, StateError>;
    async fn get_tenant_by_key_hash(&self, hash: [u8; 32]) -> Result<Option<Tenant>, StateError>;

    async fn model_limits(&self) -> Result<Vec<ModelLimits>, StateError>;

    /// Sum of `cost_usd` recorded for `account_id` since the start of the
    /// current UTC calendar month.
    async fn monthly_spend_usd(&self, account_id: &AccountId) -> Result<f64, StateError>;

    async fn record_usage(&self, record: &UsageRecord) -> Result<(), StateError>;
    async fn append_request_log(&self, record: &RequestLogRecord) -> Result<(), StateError>;
}
