use chrono::{DateTime, Utc};
use dashmap::DashMap;
use relay_core::AccountId;

const BASE_SECS: i64 = 15;
const MAX_SECS: i64 = 300;

/// Why an account was cooled down, surfaced on `X-Proxy-Strategy`-adjacent
/// diagnostics and carried into the usage row for the failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownReason {
    ConnectionError,
    RateLimited,
    ServerError,
}

impl CooldownReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionError => "connection_error",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
        }
    }
}

#[derive(Debug, Clone)]
struct CooldownEntry {
    until: DateTime<Utc>,
    failures: u32,
}

/// Best-effort, process-local record of accounts currently skipped by the
/// router. Not backed by a [`relay_state::ConfigStore`] — restarting the
/// process clears every cooldown.
#[derive(Default)]
pub struct CooldownStore {
    entries: DashMap<AccountId, CooldownEntry>,
}

impl CooldownStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cool `id` down. `retry_after` takes precedence over the exponential
    /// backoff when the upstream told us explicitly how long to wait.
    pub fn set(&self, id: &AccountId, _reason: CooldownReason, retry_after: Option<chrono::Duration>) {
        let now = Utc::now();
        let mut entry = self.entries.entry(id.clone()).or_insert(CooldownEntry { until: now, failures: 0 });
        entry.failures += 1;
        let duration = match retry_after {
            Some(d) => d,
            None => {
                let exp = BASE_SECS.saturating_mul(1i64 << (entry.failures - 1).min(20));
                chrono::Duration::seconds(exp.min(MAX_SECS))
            }
        };
        entry.until = now + duration;
    }

    /// Returns `true` iff `id` has an entry whose expiry is still in the
    /// future. A past-expiry entry is removed as a side effect of the read.
    #[must_use]
    pub fn is_cooled(&self, id: &AccountId) -> bool {
        let expired = matches!(self.entries.get(id), Some(e) if e.until <= Utc::now());
        if expired {
            self.entries.remove(id);
            return false;
        }
        self.entries.get(id).is_some_and(|e| e.until > Utc::now())
    }

    /// Expiry timestamp for `id`, used to sort cooled accounts to the end
    /// of a candidate list by ascending expiry.
    #[must_use]
    pub fn cooldown_until(&self, id: &AccountId) -> Option<DateTime<Utc>> {
        self.entries.get(id).map(|e| e.until)
    }

    pub fn clear(&self, id: &AccountId) {
        self.entries.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_failure_uses_base_duration() {
        let store = CooldownStore::new();
        let id: AccountId = "a1".into();
        store.set(&id, CooldownReason::ConnectionError, None);
        let until = store.cooldown_until(&id).unwrap();
        let delta = (until - Utc::now()).num_seconds();
        assert!((14..=15).contains(&delta), "delta was {delta}");
    }

    #[test]
    fn successive_failures_back_off_exponentially_up_to_max() {
        let store = CooldownStore::new();
        let id: AccountId = "a1".into();
        let mut last = 0i64;
        for _ in 0..10 {
            store.set(&id, CooldownReason::ConnectionError, None);
            let until = store.cooldown_until(&id).unwrap();
            let delta = (until - Utc::now()).num_seconds();
            assert!(delta >= last, "cooldown duration decreased: {last} -> {delta}");
            last = delta;
        }
        assert!(last <= MAX_SECS);
    }

    #[test]
    fn retry_after_overrides_backoff() {
        let store = CooldownStore::new();
        let id: AccountId = "a1".into();
        store.set(&id, CooldownReason::RateLimited, Some(chrono::Duration::seconds(30)));
        let until = store.cooldown_until(&id).unwrap();
        let delta = (until - Utc::now()).num_seconds();
        assert!((28..=30).contains(&delta));
    }

    #[test]
    fn is_cooled_false_when_no_entry() {
        let store = CooldownStore::new();
        assert!(!store.is_cooled(&"nope".into()));
    }

    #[test]
    fn clear_removes_entry() {
        let store = CooldownStore::new();
        let id: AccountId = "a1".into();
        store.set(&id, CooldownReason::ServerError, None);
        assert!(store.is_cooled(&id));
        store.clear(&id);
        assert!(!store.is_cooled(&id));
    }
}
