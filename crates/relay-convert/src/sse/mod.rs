//! Online SSE translation between the two wire shapes. Each converter is
//! fed one decoded upstream event at a time and returns the (possibly
//! empty) sequence of events to forward downstream, keeping per-index
//! state across calls the way the spec's §4.G online-converter
//! description requires.

pub mod anthropic_to_openai;
pub mod openai_to_anthropic;

pub use anthropic_to_openai::AnthropicToOpenAiStream;
pub use openai_to_anthropic::OpenAiToAnthropicStream;
