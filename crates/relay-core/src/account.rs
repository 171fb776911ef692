use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::ids::AccountId;

/// The upstream personality an [`Account`] speaks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    Anthropic,
    Openai,
    OpenaiCompat,
    CodexSub,
    Custom,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::Openai => "openai",
            Self::OpenaiCompat => "openai-compat",
            Self::CodexSub => "codex-sub",
            Self::Custom => "custom",
        }
    }
}

/// How an [`Account`] authenticates with its upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    ApiKey,
    OAuth,
}

/// Observable health of an account, surfaced to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    RateLimited,
    Expired,
    Error,
    Unknown,
}

impl Default for AccountStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

/// Opaque refresh material for OAuth accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshMaterial {
    pub refresh_token: SecretString,
    pub client_id: Option<String>,
}

/// An upstream identity the router may select as a candidate.
///
/// `credential` and `refresh` are only ever populated with plaintext after
/// decryption on load, for the lifetime of a single resolve cycle (see
/// invariant 4 in the data model). The struct derives neither `Serialize`
/// nor any trait that would let the decrypted material leak into a log
/// line: callers must reach into the fields explicitly.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub provider: ProviderKind,
    pub auth: AuthKind,
    pub credential: SecretString,
    pub refresh: Option<RefreshMaterial>,
    pub expires_at: Option<DateTime<Utc>>,
    pub base_url: Option<String>,
    pub priority: i32,
    pub rpm_cap: u32,
    pub monthly_budget_usd: Option<f64>,
    pub enabled: bool,
    pub status: AccountStatus,
    pub error_count: u32,
    pub last_used_at: Option<DateTime<Utc>>,
    /// ChatGPT account id, required only by the Codex subscription adapter.
    pub chatgpt_account_id: Option<String>,
}

impl Account {
    #[must_use]
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.auth == AuthKind::OAuth
            && self
                .expires_at
                .is_some_and(|exp| (exp - now).num_seconds() < 300)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn account(expires_in_secs: i64) -> Account {
        Account {
            id: "a1".into(),
            name: "test".into(),
            provider: ProviderKind::Anthropic,
            auth: AuthKind::OAuth,
            credential: SecretString::new("tok".into()),
            refresh: None,
            expires_at: Some(Utc::now() + chrono::Duration::seconds(expires_in_secs)),
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

    #[test]
    fn needs_refresh_when_close_to_expiry() {
        assert!(account(120).needs_refresh(Utc::now()));
        assert!(!account(600).needs_refresh(Utc::now()));
    }

    #[test]
    fn api_key_accounts_never_need_refresh() {
        let mut a = account(10);
        a.auth = AuthKind::ApiKey;
        assert!(!a.needs_refresh(Utc::now()));
    }
}
