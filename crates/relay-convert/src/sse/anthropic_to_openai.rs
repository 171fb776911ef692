//! Anthropic SSE -> OpenAI `chat.completion.chunk` events, online.

use std::collections::HashMap;

use relay_core::wire::anthropic::{StreamDelta, StreamEvent};
use relay_core::wire::openai::{ChunkChoice, Delta, FunctionCallDelta, StreamChunk, ToolCallDelta, Usage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    ToolCall,
    Other,
}

fn block_kind(content_block: &serde_json::Value) -> BlockKind {
    match content_block.get("type").and_then(serde_json::Value::as_str) {
        Some("tool_use") => BlockKind::ToolCall,
        Some("text") => BlockKind::Text,
        _ => BlockKind::Other,
    }
}

/// Per-stream conversion state. Constructed once per response with the
/// chunk `id` / `model` that will be echoed on every emitted chunk.
pub struct AnthropicToOpenAiStream {
    id: String,
    model: String,
    blocks: HashMap<usize, BlockKind>,
    wrote_role_preamble: bool,
}

impl AnthropicToOpenAiStream {
    #[must_use]
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self { id: id.into(), model: model.into(), blocks: HashMap::new(), wrote_role_preamble: false }
    }

    fn chunk(&self, choices: Vec<ChunkChoice>, usage: Option<Usage>) -> StreamChunk {
        StreamChunk { id: self.id.clone(), object: "chat.completion.chunk".to_owned(), model: self.model.clone(), choices, usage }
    }

    fn role_preamble(&mut self) -> Vec<StreamChunk> {
        if self.wrote_role_preamble {
            return Vec::new();
        }
        self.wrote_role_preamble = true;
        vec![self.chunk(
            vec![ChunkChoice { index: 0, delta: Delta { role: Some("assistant".to_owned()), content: None, tool_calls: None }, finish_reason: None }],
            None,
        )]
    }

    /// Process one Anthropic SSE event, returning zero or more OpenAI
    /// chunks to forward. Call [`Self::finish`] once the upstream stream
    /// ends to flush the terminal usage/finish-reason chunk; the caller
    /// is responsible for writing the `[DONE]` sentinel after that.
    pub fn process(&mut self, event: StreamEvent) -> Vec<StreamChunk> {
        match event {
            StreamEvent::MessageStart { .. } => self.role_preamble(),
            StreamEvent::ContentBlockStart { index, content_block } => {
                let kind = block_kind(&content_block);
                self.blocks.insert(index, kind);
                let mut out = self.role_preamble();
                if kind == BlockKind::ToolCall {
                    let (id, name) = (
                        content_block.get("id").and_then(serde_json::Value::as_str).unwrap_or_default().to_owned(),
                        content_block.get("name").and_then(serde_json::Value::as_str).unwrap_or_default().to_owned(),
                    );
                    out.push(self.chunk(
                        vec![ChunkChoice {
                            index: 0,
                            delta: Delta {
                                role: None,
                                content: None,
                                tool_calls: Some(vec![ToolCallDelta {
                                    index,
                                    id: Some(id),
                                    r#type: Some("function".to_owned()),
                                    function: Some(FunctionCallDelta { name: Some(name), arguments: None }),
                                }]),
                            },
                            finish_reason: None,
                        }],
                        None,
                    ));
                }
                out
            }
            StreamEvent::ContentBlockDelta { index, delta } => match (self.blocks.get(&index), delta) {
                (Some(BlockKind::Text), StreamDelta::TextDelta { text }) => vec![self.chunk(
                    vec![ChunkChoice { index: 0, delta: Delta { role: None, content: Some(text), tool_calls: None }, finish_reason: None }],
                    None,
                )],
                (Some(BlockKind::ToolCall), StreamDelta::InputJsonDelta { partial_json }) => vec![self.chunk(
                    vec![ChunkChoice {
                        index: 0,
                        delta: Delta {
                            role: None,
                            content: None,
                            tool_calls: Some(vec![ToolCallDelta {
                                index,
                                id: None,
                                r#type: None,
                                function: Some(FunctionCallDelta { name: None, arguments: Some(partial_json) }),
                            }]),
                        },
                        finish_reason: None,
                    }],
                    None,
                )],
                _ => Vec::new(),
            },
            StreamEvent::ContentBlockStop { index } => {
                self.blocks.remove(&index);
                Vec::new()
            }
            StreamEvent::MessageDelta { delta, usage } => {
                let stop_reason = delta.get("stop_reason").and_then(serde_json::Value::as_str);
                let mut out = Vec::new();
                if let Some(reason) = stop_reason {
                    out.push(self.chunk(
                        vec![ChunkChoice { index: 0, delta: Delta::default(), finish_reason: Some(stop_reason_to_openai(reason)) }],
                        None,
                    ));
                }
                if let Some(usage) = usage {
                    out.push(self.chunk(
                        Vec::new(),
                        Some(Usage {
                            prompt_tokens: usage.input_tokens,
                            completion_tokens: usage.output_tokens,
                            total_tokens: usage.input_tokens + usage.output_tokens,
                        }),
                    ));
                }
                out
            }
            StreamEvent::MessageStop | StreamEvent::Ping | StreamEvent::Error { .. } => Vec::new(),
        }
    }
}

fn stop_reason_to_openai(reason: &str) -> String {
    match reason {
        "end_turn" => "stop",
        "tool_use" => "tool_calls",
        "max_tokens" => "length",
        "stop_sequence" => "stop",
        other => other,
    }
    .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::wire::anthropic::Usage as AUsage;
    use serde_json::json;

    #[test]
    fn text_block_emits_role_preamble_then_content_deltas() {
        let mut conv = AnthropicToOpenAiStream::new("msg_1", "claude-sonnet-4");
        let chunks = conv.process(StreamEvent::ContentBlockStart { index: 0, content_block: json!({"type": "text", "text": ""}) });
        assert_eq!(chunks[0].choices[0].delta.role.as_deref(), Some("assistant"));

        let chunks = conv.process(StreamEvent::ContentBlockDelta { index: 0, delta: StreamDelta::TextDelta { text: "hi".into() } });
        assert_eq!(chunks[0].choices[0].delta.content.as_deref(), Some("hi"));
    }

    #[test]
    fn tool_use_block_opens_tool_call_with_new_index() {
        let mut conv = AnthropicToOpenAiStream::new("msg_1", "claude-sonnet-4");
        let chunks = conv.process(StreamEvent::ContentBlockStart {
            index: 0,
            content_block: json!({"type": "tool_use", "id": "call_1", "name": "get_weather", "input": {}}),
        });
        let tool_chunk = chunks.iter().find(|c| !c.choices.is_empty() && c.choices[0].delta.tool_calls.is_some()).unwrap();
        let calls = tool_chunk.choices[0].delta.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id.as_deref(), Some("call_1"));
        assert_eq!(calls[0].function.as_ref().unwrap().name.as_deref(), Some("get_weather"));

        let chunks = conv.process(StreamEvent::ContentBlockDelta {
            index: 0,
            delta: StreamDelta::InputJsonDelta { partial_json: "{\"city\":\"nyc\"}".into() },
        });
        let calls = chunks[0].choices[0].delta.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.as_ref().unwrap().arguments.as_deref(), Some("{\"city\":\"nyc\"}"));
    }

    #[test]
    fn message_delta_emits_finish_reason_and_usage_chunks() {
        let mut conv = AnthropicToOpenAiStream::new("msg_1", "claude-sonnet-4");
        let chunks = conv.process(StreamEvent::MessageDelta {
            delta: json!({"stop_reason": "end_turn"}),
            usage: Some(AUsage { input_tokens: 10, output_tokens: 20, cache_creation_input_tokens: 0, cache_read_input_tokens: 0 }),
        });
        assert_eq!(chunks[0].choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(chunks[1].usage.as_ref().unwrap().total_tokens, 30);
        assert!(chunks[1].choices.is_empty());
    }

    #[test]
    fn thinking_delta_is_dropped() {
        let mut conv = AnthropicToOpenAiStream::new("msg_1", "claude-sonnet-4");
        conv.process(StreamEvent::ContentBlockStart { index: 0, content_block: json!({"type": "thinking"}) });
        let chunks = conv.process(StreamEvent::ContentBlockDelta { index: 0, delta: StreamDelta::ThinkingDelta { thinking: "scratch".into() } });
        assert!(chunks.is_empty());
    }
}
