//! Adapters for the four upstream personalities a relay account can
//! speak: native Anthropic, the OpenAI-compatible chat-completions
//! dialect shared by OpenAI itself and its many compatible providers,
//! the Codex-subscription Responses API, and a raw custom pass-through.

pub mod adapter;
pub mod anthropic;
pub mod codex;
pub mod custom;
pub mod error;
pub mod openai_compat;
pub mod registry;
pub mod response;
pub mod send;
pub mod url;

pub use adapter::ProviderAdapter;
pub use anthropic::AnthropicAdapter;
pub use codex::CodexSubAdapter;
pub use custom::CustomAdapter;
pub use error::ProviderError;
pub use openai_compat::OpenAiCompatAdapter;
pub use registry::AdapterRegistry;
pub use response::{ProviderResponse, ResponseBody, UsageCounters};
