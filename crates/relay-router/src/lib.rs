//! Candidate resolution for relay: cooldowns, sliding-window rate limits,
//! OAuth token refresh, and the router's strategy-driven ordering.

pub mod cooldown;
pub mod rate_limit;
pub mod refresh;
pub mod router;

pub use cooldown::{CooldownReason, CooldownStore};
pub use rate_limit::RateLimiter;
pub use refresh::{spawn_refresh_loop, TokenRefresher};
pub use router::{reorder_around_cooldowns, Candidate, Resolved, Router};
