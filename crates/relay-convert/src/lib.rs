//! Bidirectional conversion between the Anthropic Messages wire format and
//! the OpenAI Chat Completions wire format, plus the narrower bridge to the
//! Codex-subscription Responses API. Covers buffered request/response
//! bodies and online SSE translation that keeps per-block state across
//! events.

pub mod codex;
pub mod error;
pub mod request;
pub mod response;
pub mod sse;

pub use codex::{chat_completions_to_responses, responses_to_chat_completions, CodexResponsesStream};
pub use error::ConvertError;
pub use request::{anthropic_to_openai_request, openai_to_anthropic_request};
pub use response::{anthropic_to_openai_response, openai_to_anthropic_response};
pub use sse::{AnthropicToOpenAiStream, OpenAiToAnthropicStream};
