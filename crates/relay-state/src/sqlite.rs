use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_core::{Account, AccountId, AccountStatus, AuthKind, ConfigId, ModelLimits, ProviderKind, RefreshMaterial, RequestLogRecord, RoutingConfig, Strategy, Tenant, TenantId, Tier, TierBinding, UsageRecord};
use secrecy::{ExposeSecret, SecretString};
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::error::StateError;
use crate::migrations;
use crate::store::ConfigStore;
use relay_crypto::CredentialCipher;

/// SQLite-backed [`ConfigStore`]. Account credentials and OAuth refresh
/// tokens are stored encrypted at rest via [`CredentialCipher`] and
/// decrypted only as they're read into an in-memory [`Account`].
pub struct SqliteConfigStore {
    pool: SqlitePool,
    cipher: CredentialCipher,
}

impl SqliteConfigStore {
    /// Connect to `database_url` (e.g. `sqlite://relay.db`), creating the
    /// file if absent, and run migrations.
    pub async fn connect(database_url: &str, cipher: CredentialCipher) -> Result<Self, StateError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StateError::Connection(e.to_string()))?
            .create_if_missing(true);
        // A single connection keeps an in-memory database alive for the
        // life of the pool; separate connections would each see their own
        // empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;
        migrations::run_migrations(&pool).await?;
        Ok(Self { pool, cipher })
    }

    fn decrypt_or_err(&self, envelope: &str) -> Result<SecretString, StateError> {
        self.cipher.decrypt(envelope).map_err(|e| StateError::Backend(e.to_string()))
    }

    fn account_from_row(&self, row: &sqlx::sqlite::SqliteRow) -> Result<Account, StateError> {
        let provider: String = row.try_get("provider")?;
        let auth_kind: String = row.try_get("auth_kind")?;
        let status: String = row.try_get("status")?;
        let encrypted_credential: String = row.try_get("encrypted_credential")?;
        let encrypted_refresh_token: Option<String> = row.try_get("encrypted_refresh_token")?;
        let refresh_client_id: Option<String> = row.try_get("refresh_client_id")?;
        let expires_at: Option<String> = row.try_get("expires_at")?;
        let last_used_at: Option<String> = row.try_get("last_used_at")?;

        let credential = self.decrypt_or_err(&encrypted_credential)?;
        let refresh = match encrypted_refresh_token {
            Some(enc) => Some(RefreshMaterial {
                refresh_token: self.decrypt_or_err(&enc)?,
                client_id: refresh_client_id,
            }),
            None => None,
        };

        Ok(Account {
            id: AccountId::from(row.try_get::<String, _>("id")?),
            name: row.try_get("name")?,
            provider: parse_provider(&provider),
            auth: parse_auth_kind(&auth_kind),
            credential,
            refresh,
            expires_at: expires_at.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc)),
            base_url: row.try_get("base_url")?,
            priority: row.try_get("priority")?,
            rpm_cap: row.try_get::<i64, _>("rpm_cap")? as u32,
            monthly_budget_usd: row.try_get("monthly_budget_usd")?,
            enabled: row.try_get::<i64, _>("enabled")? != 0,
            status: parse_status(&status),
            error_count: row.try_get::<i64, _>("error_count")? as u32,
            last_used_at: last_used_at.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc)),
            chatgpt_account_id: row.try_get("chatgpt_account_id")?,
        })
    }
}

fn parse_provider(s: &str) -> ProviderKind {
    match s {
        "openai" => ProviderKind::Openai,
        "openai-compat" => ProviderKind::OpenaiCompat,
        "codex-sub" => ProviderKind::CodexSub,
        "custom" => ProviderKind::Custom,
        _ => ProviderKind::Anthropic,
    }
}

fn parse_auth_kind(s: &str) -> AuthKind {
    if s == "oauth" { AuthKind::OAuth } else { AuthKind::ApiKey }
}

fn parse_status(s: &str) -> AccountStatus {
    match s {
        "active" => AccountStatus::Active,
        "rate_limited" => AccountStatus::RateLimited,
        "expired" => AccountStatus::Expired,
        "error" => AccountStatus::Error,
        _ => AccountStatus::Unknown,
    }
}

fn status_to_str(status: AccountStatus) -> &'static str {
    match status {
        AccountStatus::Active => "active",
        AccountStatus::RateLimited => "rate_limited",
        AccountStatus::Expired => "expired",
        AccountStatus::Error => "error",
        AccountStatus::Unknown => "unknown",
    }
}

fn parse_strategy(s: &str) -> Strategy {
    match s {
        "round-robin" => Strategy::RoundRobin,
        "least-used" => Strategy::LeastUsed,
        "budget-aware" => Strategy::BudgetAware,
        _ => Strategy::Priority,
    }
}

fn parse_tier(s: &str) -> Option<Tier> {
    match s {
        "opus" => Some(Tier::Opus),
        "sonnet" => Some(Tier::Sonnet),
        "haiku" => Some(Tier::Haiku),
        _ => None,
    }
}

#[async_trait]
impl ConfigStore for SqliteConfigStore {
    async fn get_account(&self, id: &AccountId) -> Result<Option<Account>, StateError> {
        let row = sqlx::query("SELECT * FROM accounts WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(|r| self.account_from_row(r)).transpose()
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, StateError> {
        let rows = sqlx::query("SELECT * FROM accounts").fetch_all(&self.pool).await?;
        rows.iter().map(|r| self.account_from_row(r)).collect()
    }

    async fn upsert_account(&self, account: &Account) -> Result<(), StateError> {
        let encrypted_credential = self
            .cipher
            .encrypt(account.credential.expose_secret())
            .map_err(|e| StateError::Backend(e.to_string()))?;
        let (encrypted_refresh_token, refresh_client_id) = match &account.refresh {
            Some(r) => (
                Some(
                    self.cipher
                        .encrypt(r.refresh_token.expose_secret())
                        .map_err(|e| StateError::Backend(e.to_string()))?,
                ),
                r.client_id.clone(),
            ),
            None => (None, None),
        };

        sqlx::query(
            "INSERT INTO accounts (id, name, provider, auth_kind, encrypted_credential, encrypted_refresh_token,
                refresh_client_id, expires_at, base_url, priority, rpm_cap, monthly_budget_usd, enabled, status,
                error_count, last_used_at, chatgpt_account_id)
             VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)
             ON CONFLICT(id) DO UPDATE SET name=excluded.name, provider=excluded.provider,
                auth_kind=excluded.auth_kind, encrypted_credential=excluded.encrypted_credential,
                encrypted_refresh_token=excluded.encrypted_refresh_token, refresh_client_id=excluded.refresh_client_id,
                expires_at=excluded.expires_at, base_url=excluded.base_url, priority=excluded.priority,
                rpm_cap=excluded.rpm_cap, monthly_budget_usd=excluded.monthly_budget_usd, enabled=excluded.enabled,
                status=excluded.status, error_count=excluded.error_count, last_used_at=excluded.last_used_at,
                chatgpt_account_id=excluded.chatgpt_account_id",
        )
        .bind(account.id.as_str())
        .bind(&account.name)
        .bind(account.provider.as_str())
        .bind(if account.auth == AuthKind::OAuth { "oauth" } else { "api_key" })
        .bind(encrypted_credential)
        .bind(encrypted_refresh_token)
        .bind(refresh_client_id)
        .bind(account.expires_at.map(|d| d.to_rfc3339()))
        .bind(&account.base_url)
        .bind(account.priority)
        .bind(i64::from(account.rpm_cap))
        .bind(account.monthly_budget_usd)
        .bind(i64::from(account.enabled))
        .bind(status_to_str(account.status))
        .bind(i64::from(account.error_count))
        .bind(account.last_used_at.map(|d| d.to_rfc3339()))
        .bind(&account.chatgpt_account_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_active_config(&self) -> Result<Option<RoutingConfig>, StateError> {
        let row = sqlx::query("SELECT * FROM routing_configs WHERE active = 1 LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| RoutingConfig {
            id: ConfigId::from(r.get::<String, _>("id")),
            name: r.get("name"),
            strategy: parse_strategy(&r.get::<String, _>("strategy")),
            active: true,
        }))
    }

    async fn get_config(&self, id: &ConfigId) -> Result<Option<RoutingConfig>, StateError> {
        let row = sqlx::query("SELECT * FROM routing_configs WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| RoutingConfig {
            id: ConfigId::from(r.get::<String, _>("id")),
            name: r.get("name"),
            strategy: parse_strategy(&r.get::<String, _>("strategy")),
            active: r.get::<i64, _>("active") != 0,
        }))
    }

    async fn list_tier_bindings(&self, config_id: &ConfigId) -> Result<Vec<TierBinding>, StateError> {
        let rows = sqlx::query("SELECT * FROM tier_bindings WHERE config_id = ?")
            .bind(config_id.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|r| {
                let tier = parse_tier(&r.get::<String, _>("tier"))?;
                Some(TierBinding {
                    config_id: ConfigId::from(r.get::<String, _>("config_id")),
                    tier,
                    account_id: AccountId::from(r.get::<String, _>("account_id")),
                    priority: r.get("priority"),
                    target_model: r.get("target_model"),
                })
            })
            .collect())
    }

    async fn get_tenant(&self, id: &TenantId) -> Result<Option<Tenant>, StateError> {
        let row = sqlx::query("SELECT * FROM tenants WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(tenant_from_row).transpose()
    }

    async fn get_tenant_by_key_hash(&self, hash: [u8; 32]) -> Result<Option<Tenant>, StateError> {
        let row = sqlx::query("SELECT * FROM tenants WHERE key_hash = ?")
            .bind(hex::encode(hash))
            .fetch_optional(&self.pool)
            .await?;
        row.map(tenant_from_row).transpose()
    }

    async fn model_limits(&self) -> Result<Vec<ModelLimits>, StateError> {
        let rows = sqlx::query("SELECT * FROM model_limits").fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|r| ModelLimits {
                model_prefix: r.get("model_prefix"),
                max_output_tokens: r.get::<i64, _>("max_output_tokens") as u32,
                supports_tool_calling: r.get::<i64, _>("supports_tool_calling") != 0,
                supports_reasoning: r.get::<i64, _>("supports_reasoning") != 0,
            })
            .collect())
    }

    async fn monthly_spend_usd(&self, account_id: &AccountId) -> Result<f64, StateError> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(cost_usd), 0.0) as total FROM usage_records
             WHERE account_id = ? AND strftime('%Y-%m', created_at) = strftime('%Y-%m', 'now')",
        )
        .bind(account_id.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("total"))
    }

    async fn record_usage(&self, record: &UsageRecord) -> Result<(), StateError> {
        sqlx::query(
            "INSERT INTO usage_records (account_id, config_id, tenant_id, tier, original_model, routed_model,
                input_tokens, output_tokens, cache_read_tokens, cache_write_tokens, cost_usd, created_at)
             VALUES (?,?,?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(record.account_id.as_str())
        .bind(record.config_id.as_ref().map(ConfigId::as_str))
        .bind(record.tenant_id.as_ref().map(TenantId::as_str))
        .bind(record.tier.map(|t| t.as_str()))
        .bind(&record.original_model)
        .bind(&record.routed_model)
        .bind(record.input_tokens as i64)
        .bind(record.output_tokens as i64)
        .bind(record.cache_read_tokens as i64)
        .bind(record.cache_write_tokens as i64)
        .bind(record.cost_usd)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_request_log(&self, record: &RequestLogRecord) -> Result<(), StateError> {
        sqlx::query(
            "INSERT INTO request_log (id, tenant_id, account_id, path, status, duration_ms, created_at)
             VALUES (?,?,?,?,?,?,?)",
        )
        .bind(record.id.to_string())
        .bind(record.tenant_id.as_ref().map(TenantId::as_str))
        .bind(record.account_id.as_ref().map(AccountId::as_str))
        .bind(&record.path)
        .bind(i64::from(record.status))
        .bind(record.duration_ms as i64)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn tenant_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Tenant, StateError> {
    let key_hash_hex: String = row.try_get("key_hash")?;
    let key_hash_bytes = hex::decode(&key_hash_hex).map_err(|e| StateError::Serialization(e.to_string()))?;
    let mut key_hash = [0u8; 32];
    if key_hash_bytes.len() == 32 {
        key_hash.copy_from_slice(&key_hash_bytes);
    }
    let settings_json: String = row.try_get("settings")?;
    let settings = serde_json::from_str(&settings_json).map_err(|e| StateError::Serialization(e.to_string()))?;

    Ok(Tenant {
        id: TenantId::from(row.try_get::<String, _>("id")?),
        display_name: row.try_get("display_name")?,
        key_hash,
        pinned_config_id: row.try_get::<Option<String>, _>("pinned_config_id")?.map(ConfigId::from),
        rate_cap: row.try_get::<Option<i64>, _>("rate_cap")?.map(|v| v as u32),
        settings,
        enabled: row.try_get::<i64, _>("enabled")? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_crypto::Key;

    async fn store() -> SqliteConfigStore {
        let cipher = CredentialCipher::new(Key::from_bytes([42u8; 32]));
        SqliteConfigStore::connect("sqlite::memory:", cipher).await.unwrap()
    }

    #[tokio::test]
    async fn round_trips_account_credential_through_encryption() {
        let store = store().await;
        let account = Account {
            id: "a1".into(),
            name: "test".into(),
            provider: ProviderKind::Anthropic,
            auth: AuthKind::ApiKey,
            credential: SecretString::new("sk-ant-super-secret".into()),
            refresh: None,
            expires_at: None,
            base_url: None,
            priority: 5,
            rpm_cap: 60,
            monthly_budget_usd: Some(100.0),
            enabled: true,
            status: AccountStatus::Active,
            error_count: 0,
            last_used_at: None,
            chatgpt_account_id: None,
        };
        store.upsert_account(&account).await.unwrap();

        let fetched = store.get_account(&"a1".into()).await.unwrap().unwrap();
        assert_eq!(fetched.credential.expose_secret(), "sk-ant-super-secret");
        assert_eq!(fetched.priority, 5);
    }

    #[tokio::test]
    async fn missing_account_returns_none() {
        let store = store().await;
        assert!(store.get_account(&"nope".into()).await.unwrap().is_none());
    }
}
