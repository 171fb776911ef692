use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, ConfigId};

/// Coarse weight class inferred from an inbound model name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Opus,
    Sonnet,
    Haiku,
}

impl Tier {
    /// Detect a tier from a model name by lowercase-substring match, in the
    /// fixed precedence order opus, sonnet, haiku. Returns `None` when the
    /// model name mentions none of them.
    #[must_use]
    pub fn detect(model: &str) -> Option<Self> {
        let lower = model.to_lowercase();
        if lower.contains("opus") {
            Some(Self::Opus)
        } else if lower.contains("sonnet") {
            Some(Self::Sonnet)
        } else if lower.contains("haiku") {
            Some(Self::Haiku)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Opus => "opus",
            Self::Sonnet => "sonnet",
            Self::Haiku => "haiku",
        }
    }
}

/// The ordering discipline a [`RoutingConfig`] applies to its candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Priority,
    RoundRobin,
    LeastUsed,
    BudgetAware,
}

impl Strategy {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Priority => "priority",
            Self::RoundRobin => "round-robin",
            Self::LeastUsed => "least-used",
            Self::BudgetAware => "budget-aware",
        }
    }
}

/// A named routing plan. At most one is globally active at a time; a
/// tenant may pin a specific config, overriding the active one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub id: ConfigId,
    pub name: String,
    pub strategy: Strategy,
    pub active: bool,
}

/// A single (config, tier) -> account binding with optional priority and
/// target-model override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierBinding {
    pub config_id: ConfigId,
    pub tier: Tier,
    pub account_id: AccountId,
    pub priority: i32,
    pub target_model: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_detection_precedence() {
        assert_eq!(Tier::detect("claude-opus-4"), Some(Tier::Opus));
        assert_eq!(Tier::detect("claude-3-5-sonnet"), Some(Tier::Sonnet));
        assert_eq!(Tier::detect("claude-haiku"), Some(Tier::Haiku));
        assert_eq!(Tier::detect("gpt-4o"), None);
    }

    #[test]
    fn tier_detection_is_case_insensitive() {
        assert_eq!(Tier::detect("CLAUDE-OPUS-4"), Some(Tier::Opus));
    }
}
