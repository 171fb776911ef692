use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use relay_core::{Account, AccountId, ConfigId, Strategy, Tenant, Tier};
use relay_state::ConfigStore;

use crate::rate_limit::RateLimiter;

/// One (account, target-model) pair the dispatcher may attempt.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub account: Account,
    pub target_model: String,
}

/// A resolved candidate list plus the strategy that produced it, so the
/// dispatcher can report `X-Proxy-Strategy` (spec §4.H). `strategy` is
/// `None` for the no-config single-account fallback, which has no
/// strategy name to report.
#[derive(Debug, Clone, Default)]
pub struct Resolved {
    pub candidates: Vec<Candidate>,
    pub strategy: Option<Strategy>,
}

/// Resolves an inbound model name (and optional tenant) to an ordered list
/// of candidates. Holds no state of its own beyond the round-robin
/// counters; cooldowns and rate limits are read through, never written.
pub struct Router {
    store: Arc<dyn ConfigStore>,
    rate_limiter: Arc<RateLimiter>,
    round_robin: DashMap<(ConfigId, Option<Tier>), AtomicUsize>,
}

impl Router {
    #[must_use]
    pub fn new(store: Arc<dyn ConfigStore>, rate_limiter: Arc<RateLimiter>) -> Self {
        Self { store, rate_limiter, round_robin: DashMap::new() }
    }

    /// Resolve `model` (optionally for `tenant`) to an ordered candidate
    /// list. An empty candidate list means the dispatcher must return 503.
    pub async fn resolve(&self, model: &str, tenant: Option<&Tenant>) -> Resolved {
        let tier = Tier::detect(model);

        let config = match self.select_config(tenant).await {
            Some(c) => c,
            None => {
                return Resolved { candidates: self.no_config_fallback(model).await, strategy: None };
            }
        };

        let bindings = match self.store.list_tier_bindings(&config.id).await {
            Ok(b) => b,
            Err(_) => return Resolved { candidates: Vec::new(), strategy: Some(config.strategy) },
        };
        let bindings: Vec<_> = bindings.into_iter().filter(|b| tier.is_none_or(|t| b.tier == t)).collect();

        let mut candidates = Vec::new();
        let mut spend_by_account = HashMap::new();
        for binding in &bindings {
            let Ok(Some(account)) = self.store.get_account(&binding.account_id).await else { continue };
            if !account.enabled {
                continue;
            }
            if self.rate_limiter.is_rate_limited(account.id.as_str(), account.rpm_cap) {
                continue;
            }
            let spend = self.store.monthly_spend_usd(&account.id).await.unwrap_or(0.0);
            if let Some(budget) = account.monthly_budget_usd {
                if spend >= budget {
                    continue;
                }
            }
            spend_by_account.insert(account.id.as_str().to_owned(), spend);
            let target_model = binding.target_model.clone().unwrap_or_else(|| model.to_owned());
            candidates.push((binding.priority, account, target_model));
        }

        let candidates = self.apply_strategy(config.strategy, &config.id, tier, candidates, &spend_by_account);
        Resolved { candidates, strategy: Some(config.strategy) }
    }

    async fn select_config(&self, tenant: Option<&Tenant>) -> Option<relay_core::RoutingConfig> {
        if let Some(t) = tenant {
            if let Some(pinned) = &t.pinned_config_id {
                if let Ok(Some(cfg)) = self.store.get_config(pinned).await {
                    return Some(cfg);
                }
            }
        }
        self.store.get_active_config().await.ok().flatten()
    }

    /// No routing config exists at all: return the single highest-priority
    /// enabled account, preferring `provider = anthropic`, with no
    /// fallback candidates.
    async fn no_config_fallback(&self, model: &str) -> Vec<Candidate> {
        let Ok(accounts) = self.store.list_accounts().await else { return Vec::new() };
        accounts
            .into_iter()
            .filter(|a| a.enabled)
            .max_by_key(|a| (a.priority, a.provider == relay_core::ProviderKind::Anthropic))
            .map(|account| vec![Candidate { target_model: model.to_owned(), account }])
            .unwrap_or_default()
    }

    fn apply_strategy(
        &self,
        strategy: Strategy,
        config_id: &ConfigId,
        tier: Option<Tier>,
        mut candidates: Vec<(i32, Account, String)>,
        spend_by_account: &HashMap<String, f64>,
    ) -> Vec<Candidate> {
        let spend_of = |id: &AccountId| spend_by_account.get(id.as_str()).copied().unwrap_or(0.0);

        match strategy {
            Strategy::Priority => {
                candidates.sort_by(|a, b| b.0.cmp(&a.0));
            }
            Strategy::RoundRobin => {
                if !candidates.is_empty() {
                    let key = (config_id.clone(), tier);
                    let counter = self.round_robin.entry(key).or_insert_with(|| AtomicUsize::new(0));
                    let n = candidates.len();
                    let start = counter.fetch_add(1, Ordering::Relaxed) % n;
                    candidates.rotate_left(start);
                }
            }
            Strategy::LeastUsed => {
                candidates.sort_by(|a, b| spend_of(&a.1.id).partial_cmp(&spend_of(&b.1.id)).unwrap_or(std::cmp::Ordering::Equal));
            }
            Strategy::BudgetAware => {
                let headroom = |a: &Account| a.monthly_budget_usd.unwrap_or(f64::INFINITY) - spend_of(&a.id);
                candidates.sort_by(|a, b| headroom(&b.1).partial_cmp(&headroom(&a.1)).unwrap_or(std::cmp::Ordering::Equal));
            }
        }

        candidates.into_iter().map(|(_, account, target_model)| Candidate { account, target_model }).collect()
    }
}

/// Sort `candidates` (already strategy-ordered) so cooled-down accounts
/// move to the end, ordered among themselves by ascending cooldown expiry,
/// while preserving strategy order within the non-cooled prefix. Called by
/// the dispatcher after [`Router::resolve`].
#[must_use]
pub fn reorder_around_cooldowns(candidates: Vec<Candidate>, cooldowns: &crate::cooldown::CooldownStore) -> Vec<Candidate> {
    let mut cooled_until: HashMap<String, chrono::DateTime<chrono::Utc>> = HashMap::new();
    let (mut fresh, mut cooled): (Vec<_>, Vec<_>) = candidates.into_iter().partition(|c| {
        if let Some(until) = cooldowns.cooldown_until(&c.account.id) {
            if cooldowns.is_cooled(&c.account.id) {
                cooled_until.insert(c.account.id.as_str().to_owned(), until);
                return false;
            }
        }
        true
    });
    cooled.sort_by_key(|c| cooled_until.get(c.account.id.as_str()).copied());
    fresh.append(&mut cooled);
    fresh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cooldown::{CooldownReason, CooldownStore};
    use relay_core::{AccountStatus, AuthKind, ModelLimits, ProviderKind, RoutingConfig, TierBinding};
    use relay_state::InMemoryConfigStore;
    use secrecy::SecretString;

    fn account(id: &str, priority: i32) -> Account {
        Account {
            id: id.into(),
            name: id.to_owned(),
            provider: ProviderKind::Anthropic,
            auth: AuthKind::ApiKey,
            credential: SecretString::new("tok".into()),
            refresh: None,
            expires_at: None,
            base_url: None,
            priority,
            rpm_cap: 0,
            monthly_budget_usd: None,
            enabled: true,
            status: AccountStatus::Active,
            error_count: 0,
            last_used_at: None,
            chatgpt_account_id: None,
        }
    }

    async fn seeded_store() -> Arc<InMemoryConfigStore> {
        let store = Arc::new(InMemoryConfigStore::new().with_model_limits(Vec::<ModelLimits>::new()));
        store.upsert_account(&account("a-low", 1)).await.unwrap();
        store.upsert_account(&account("a-high", 5)).await.unwrap();
        store
    }

    #[tokio::test]
    async fn no_config_returns_single_highest_priority_account() {
        let store = seeded_store().await;
        let router = Router::new(store.clone(), Arc::new(RateLimiter::new()));
        let resolved = router.resolve("claude-sonnet-4", None).await;
        assert_eq!(resolved.candidates.len(), 1);
        assert_eq!(resolved.candidates[0].account.id.as_str(), "a-high");
        assert!(resolved.strategy.is_none());
    }

    #[tokio::test]
    async fn priority_strategy_orders_descending_and_is_stable_across_calls() {
        let config = RoutingConfig { id: "cfg1".into(), name: "default".into(), strategy: Strategy::Priority, active: true };
        let bindings = vec![
            TierBinding { config_id: config.id.clone(), tier: Tier::Sonnet, account_id: "a-low".into(), priority: 1, target_model: None },
            TierBinding { config_id: config.id.clone(), tier: Tier::Sonnet, account_id: "a-high".into(), priority: 5, target_model: None },
        ];
        let store = Arc::new(InMemoryConfigStore::new().with_configs(vec![config]).with_tier_bindings(bindings));
        store.upsert_account(&account("a-low", 1)).await.unwrap();
        store.upsert_account(&account("a-high", 5)).await.unwrap();

        let router = Router::new(store.clone(), Arc::new(RateLimiter::new()));
        let first = router.resolve("claude-sonnet-4", None).await;
        let second = router.resolve("claude-sonnet-4", None).await;
        let ids_first: Vec<_> = first.candidates.iter().map(|c| c.account.id.as_str().to_owned()).collect();
        let ids_second: Vec<_> = second.candidates.iter().map(|c| c.account.id.as_str().to_owned()).collect();
        assert_eq!(ids_first, vec!["a-high", "a-low"]);
        assert_eq!(ids_first, ids_second);
        assert_eq!(first.strategy, Some(Strategy::Priority));
    }

    #[test]
    fn cooldown_reorder_moves_cooled_accounts_to_the_end() {
        let candidates = vec![
            Candidate { account: account("a1", 1), target_model: "m".into() },
            Candidate { account: account("a2", 1), target_model: "m".into() },
        ];
        let cooldowns = CooldownStore::new();
        cooldowns.set(&"a1".into(), CooldownReason::ServerError, None);
        let reordered = reorder_around_cooldowns(candidates, &cooldowns);
        assert_eq!(reordered[0].account.id.as_str(), "a2");
        assert_eq!(reordered[1].account.id.as_str(), "a1");
    }
}
