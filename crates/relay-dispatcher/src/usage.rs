//! Usage accounting (spec §4.H.9, §3 `UsageRecord`). Recording happens on
//! a spawned task so a slow store never adds latency to the response
//! already sent to the client.

use std::sync::Arc;

use chrono::Utc;
use relay_core::ids::{AccountId, ConfigId, TenantId};
use relay_core::routing::Tier;
use relay_core::usage::{RequestLogRecord, UsageRecord};
use relay_provider::response::UsageCounters;
use relay_state::ConfigStore;
use tracing::warn;

/// Per-million-token USD pricing, keyed by a case-insensitive substring
/// match against the routed model name (checked in declaration order, so
/// list more specific names first). No retrievable source shipped real
/// pricing data for this system, so these are the public list-price
/// figures published by each vendor as of this writing; operators who
/// need exact figures should treat `cost_usd` as an estimate.
const PRICING_TABLE: &[(&str, f64, f64)] = &[
    ("claude-opus", 15.0, 75.0),
    ("claude-sonnet", 3.0, 15.0),
    ("claude-haiku", 0.80, 4.0),
    ("gpt-4o-mini", 0.15, 0.60),
    ("gpt-4o", 2.50, 10.0),
    ("gpt-4.1-mini", 0.40, 1.60),
    ("gpt-4.1", 2.0, 8.0),
    ("o1-mini", 1.10, 4.40),
    ("o1", 15.0, 60.0),
];

/// Estimate the USD cost of one request from its token counts and the
/// model actually billed (the routed model, not the client's requested
/// alias). Unknown models cost `0.0` rather than guessing.
#[must_use]
pub fn estimate_cost_usd(routed_model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
    let lower = routed_model.to_ascii_lowercase();
    let Some(&(_, input_per_m, output_per_m)) = PRICING_TABLE.iter().find(|(name, _, _)| lower.contains(name)) else {
        return 0.0;
    };
    (input_tokens as f64 / 1_000_000.0) * input_per_m + (output_tokens as f64 / 1_000_000.0) * output_per_m
}

#[allow(clippy::too_many_arguments)]
#[must_use]
pub fn build_usage_record(
    account_id: AccountId,
    config_id: Option<ConfigId>,
    tenant_id: Option<TenantId>,
    tier: Option<Tier>,
    original_model: String,
    routed_model: String,
    usage: &UsageCounters,
) -> UsageRecord {
    let cost_usd = estimate_cost_usd(&routed_model, usage.input_tokens, usage.output_tokens);
    UsageRecord {
        account_id,
        config_id,
        tenant_id,
        tier,
        original_model,
        routed_model,
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        cache_read_tokens: 0,
        cache_write_tokens: 0,
        cost_usd,
        created_at: Utc::now(),
    }
}

/// Fire-and-forget the usage row. Errors are logged, never propagated --
/// a store outage must not turn into a client-visible failure for a
/// request that already succeeded upstream.
pub fn spawn_record_usage(store: Arc<dyn ConfigStore>, record: UsageRecord) {
    tokio::spawn(async move {
        if let Err(err) = store.record_usage(&record).await {
            warn!(error = %err, account_id = %record.account_id, "failed to record usage");
        }
    });
}

/// Fire-and-forget the per-request audit row, recorded only when the
/// tenant/account has request logging enabled (spec §3, §7).
pub fn spawn_append_request_log(store: Arc<dyn ConfigStore>, record: RequestLogRecord) {
    tokio::spawn(async move {
        if let Err(err) = store.append_request_log(&record).await {
            warn!(error = %err, path = %record.path, "failed to append request log");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_prefix_prices_nonzero() {
        let cost = estimate_cost_usd("claude-sonnet-4-20250514", 1_000_000, 1_000_000);
        assert!((cost - 18.0).abs() < 1e-9);
    }

    #[test]
    fn more_specific_prefix_wins_over_shorter_one() {
        let cost = estimate_cost_usd("gpt-4o-mini-2024-07-18", 1_000_000, 0);
        assert!((cost - 0.15).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_costs_nothing() {
        assert_eq!(estimate_cost_usd("some-unlisted-model", 1_000_000, 1_000_000), 0.0);
    }

    #[test]
    fn zero_tokens_cost_nothing() {
        assert_eq!(estimate_cost_usd("claude-opus-4", 0, 0), 0.0);
    }
}
