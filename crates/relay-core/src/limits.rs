use serde::{Deserialize, Serialize};

/// Prefix-keyed output-token / capability limits for a model or model
/// family, used to clamp inbound `max_tokens` / `max_completion_tokens`
/// before forwarding upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelLimits {
    pub model_prefix: String,
    pub max_output_tokens: u32,
    pub supports_tool_calling: bool,
    pub supports_reasoning: bool,
}

/// Resolve the applicable limit for `model` from a table: exact match
/// first, then the longest matching prefix.
#[must_use]
pub fn resolve_limits<'a>(table: &'a [ModelLimits], model: &str) -> Option<&'a ModelLimits> {
    if let Some(exact) = table.iter().find(|l| l.model_prefix == model) {
        return Some(exact);
    }
    table
        .iter()
        .filter(|l| model.starts_with(l.model_prefix.as_str()))
        .max_by_key(|l| l.model_prefix.len())
}

/// Clamp `value` (an inbound `max_tokens`-style field) against the
/// resolved limit for `model`, if any. Returns `value` unchanged when no
/// limit applies.
#[must_use]
pub fn clamp_max_tokens(table: &[ModelLimits], model: &str, value: u64) -> u64 {
    match resolve_limits(table, model) {
        Some(limit) => value.min(u64::from(limit.max_output_tokens)),
        None => value,
    }
}
