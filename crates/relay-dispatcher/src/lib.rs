//! Per-request orchestration (spec component H): composes the token
//! codec, guardrail engine, router, format converter, and provider
//! adapters into the hot path that every inbound request runs through.

pub mod auth;
pub mod classify;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod sse_pipeline;
pub mod usage;

pub use context::{Dispatcher, DispatcherConfig};
pub use dispatch::{BufferedOutcome, DispatchMeta, DispatchOutcome, DispatchRequest, StreamOutcome};
pub use error::DispatchError;
