//! Shared data model and wire types for the relay LLM proxy.
//!
//! This crate has no dependency on any other `relay-*` crate and no I/O:
//! it is pure types, conversions between them, and the small amount of
//! pure logic (tier detection, model-limit clamping) that every other
//! crate needs a single definition of.

pub mod account;
pub mod error;
pub mod ids;
pub mod limits;
pub mod routing;
pub mod tenant;
pub mod usage;
pub mod wire;

pub use account::{Account, AccountStatus, AuthKind, ProviderKind, RefreshMaterial};
pub use error::{ApiErrorKind, InboundShape};
pub use ids::{AccountId, ConfigId, TenantId};
pub use limits::{ModelLimits, clamp_max_tokens, resolve_limits};
pub use routing::{RoutingConfig, Strategy, Tier, TierBinding};
pub use tenant::Tenant;
pub use usage::{RequestLogRecord, UsageRecord};
