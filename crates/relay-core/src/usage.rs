use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, ConfigId, TenantId};
use crate::routing::Tier;

/// One row recorded after every completed (or failed) dispatch, written
/// out of band so the insert never blocks the hot path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub account_id: AccountId,
    pub config_id: Option<ConfigId>,
    pub tenant_id: Option<TenantId>,
    pub tier: Option<Tier>,
    pub original_model: String,
    pub routed_model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub cost_usd: f64,
    pub created_at: DateTime<Utc>,
}

/// One row recorded per inbound request when `request_logging` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLogRecord {
    pub id: uuid::Uuid,
    pub tenant_id: Option<TenantId>,
    pub account_id: Option<AccountId>,
    pub path: String,
    pub status: u16,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}
