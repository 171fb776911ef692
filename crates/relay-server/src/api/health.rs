use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;

use crate::api::AppState;

#[derive(Debug, Deserialize)]
pub struct HealthParams {
    #[serde(default)]
    verbose: bool,
}

/// `GET /health` -- liveness probe, spec §6. `?verbose=true` adds a
/// read-only breakdown of enabled-account counts per provider.
pub async fn health(State(state): State<AppState>, Query(params): Query<HealthParams>) -> impl IntoResponse {
    if !params.verbose {
        return Json(json!({ "status": "ok" }));
    }

    let accounts = state.store.list_accounts().await.unwrap_or_default();
    let mut by_provider: BTreeMap<&'static str, usize> = BTreeMap::new();
    for account in &accounts {
        if account.enabled {
            *by_provider.entry(account.provider.as_str()).or_insert(0) += 1;
        }
    }

    Json(json!({ "status": "ok", "enabled_accounts_by_provider": by_provider }))
}

/// `GET /v1/models` -- lists the model prefixes the proxy has limits
/// configured for, a close analogue of each upstream's own endpoint.
pub async fn list_models(State(state): State<AppState>) -> impl IntoResponse {
    let limits = state.store.model_limits().await.unwrap_or_default();
    let data: Vec<_> = limits
        .into_iter()
        .map(|l| {
            json!({
                "id": l.model_prefix,
                "object": "model",
                "max_output_tokens": l.max_output_tokens,
                "supports_tool_calling": l.supports_tool_calling,
                "supports_reasoning": l.supports_reasoning,
            })
        })
        .collect();
    Json(json!({ "object": "list", "data": data }))
}
