//! OpenAI `chat.completion.chunk` SSE -> Anthropic SSE events, online.

use std::collections::HashMap;

use relay_core::wire::anthropic::{StreamDelta, StreamEvent, Usage as AUsage};
use relay_core::wire::openai::StreamChunk;

/// Per-stream conversion state. A new Anthropic `content_block_start` of
/// type `tool_use` opens whenever an OpenAI chunk introduces a tool-call
/// delta at an index not seen before; text uses a single block at index
/// `0`, opened lazily on the first content delta.
pub struct OpenAiToAnthropicStream {
    message_started: bool,
    text_block_index: Option<usize>,
    tool_block_index: HashMap<usize, usize>,
    next_index: usize,
    pending_finish: Option<String>,
}

impl Default for OpenAiToAnthropicStream {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAiToAnthropicStream {
    #[must_use]
    pub fn new() -> Self {
        Self { message_started: false, text_block_index: None, tool_block_index: HashMap::new(), next_index: 0, pending_finish: None }
    }

    fn ensure_message_start(&mut self, chunk: &StreamChunk) -> Vec<StreamEvent> {
        if self.message_started {
            return Vec::new();
        }
        self.message_started = true;
        vec![StreamEvent::MessageStart {
            message: serde_json::json!({
                "id": chunk.id,
                "type": "message",
                "role": "assistant",
                "model": chunk.model,
                "content": [],
            }),
        }]
    }

    fn ensure_text_block(&mut self) -> Vec<StreamEvent> {
        if self.text_block_index.is_some() {
            return Vec::new();
        }
        let index = self.next_index;
        self.next_index += 1;
        self.text_block_index = Some(index);
        vec![StreamEvent::ContentBlockStart { index, content_block: serde_json::json!({"type": "text", "text": ""}) }]
    }

    fn ensure_tool_block(&mut self, tool_index: usize, id: Option<&str>, name: Option<&str>) -> Vec<StreamEvent> {
        if self.tool_block_index.contains_key(&tool_index) {
            return Vec::new();
        }
        let index = self.next_index;
        self.next_index += 1;
        self.tool_block_index.insert(tool_index, index);
        vec![StreamEvent::ContentBlockStart {
            index,
            content_block: serde_json::json!({
                "type": "tool_use",
                "id": id.unwrap_or_default(),
                "name": name.unwrap_or_default(),
                "input": {},
            }),
        }]
    }

    /// Process one OpenAI chunk, returning zero or more Anthropic events.
    pub fn process(&mut self, chunk: StreamChunk) -> Vec<StreamEvent> {
        let mut out = self.ensure_message_start(&chunk);

        let Some(choice) = chunk.choices.first() else {
            if let Some(usage) = chunk.usage {
                out.extend(self.flush_pending_finish(Some(usage)));
            }
            return out;
        };

        if let Some(content) = &choice.delta.content {
            if !content.is_empty() {
                out.extend(self.ensure_text_block());
                out.push(StreamEvent::ContentBlockDelta {
                    index: self.text_block_index.unwrap(),
                    delta: StreamDelta::TextDelta { text: content.clone() },
                });
            }
        }

        if let Some(tool_calls) = &choice.delta.tool_calls {
            for call in tool_calls {
                out.extend(self.ensure_tool_block(
                    call.index,
                    call.id.as_deref(),
                    call.function.as_ref().and_then(|f| f.name.as_deref()),
                ));
                if let Some(arguments) = call.function.as_ref().and_then(|f| f.arguments.as_deref()) {
                    let index = self.tool_block_index[&call.index];
                    out.push(StreamEvent::ContentBlockDelta { index, delta: StreamDelta::InputJsonDelta { partial_json: arguments.to_owned() } });
                }
            }
        }

        if let Some(reason) = &choice.finish_reason {
            self.pending_finish = Some(reason.clone());
            if chunk.usage.is_some() {
                out.extend(self.flush_pending_finish(chunk.usage));
            }
        } else if let Some(usage) = chunk.usage {
            out.extend(self.flush_pending_finish(Some(usage)));
        }

        out
    }

    fn flush_pending_finish(&mut self, usage: Option<relay_core::wire::openai::Usage>) -> Vec<StreamEvent> {
        let Some(reason) = self.pending_finish.take() else { return Vec::new() };
        let mut out = Vec::new();
        if let Some(index) = self.text_block_index.take() {
            out.push(StreamEvent::ContentBlockStop { index });
        }
        let tool_indices: Vec<usize> = self.tool_block_index.values().copied().collect();
        self.tool_block_index.clear();
        for index in tool_indices {
            out.push(StreamEvent::ContentBlockStop { index });
        }
        out.push(StreamEvent::MessageDelta {
            delta: serde_json::json!({ "stop_reason": finish_reason_to_anthropic(&reason) }),
            usage: usage.map(|u| AUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
                cache_creation_input_tokens: 0,
                cache_read_input_tokens: 0,
            }),
        });
        out.push(StreamEvent::MessageStop);
        out
    }

    /// Flush any terminal state if the upstream closed without ever
    /// sending the trailing usage-only chunk.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        self.flush_pending_finish(None)
    }
}

fn finish_reason_to_anthropic(reason: &str) -> String {
    match reason {
        "stop" => "end_turn",
        "length" => "max_tokens",
        "tool_calls" => "tool_use",
        other => other,
    }
    .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::wire::openai::{ChunkChoice, Delta, FunctionCallDelta, ToolCallDelta, Usage};

    fn chunk(choices: Vec<ChunkChoice>, usage: Option<Usage>) -> StreamChunk {
        StreamChunk { id: "c1".into(), object: "chat.completion.chunk".into(), model: "gpt-4o".into(), choices, usage }
    }

    #[test]
    fn first_chunk_emits_message_start() {
        let mut conv = OpenAiToAnthropicStream::new();
        let events = conv.process(chunk(
            vec![ChunkChoice { index: 0, delta: Delta { role: Some("assistant".into()), content: None, tool_calls: None }, finish_reason: None }],
            None,
        ));
        assert!(matches!(events[0], StreamEvent::MessageStart { .. }));
    }

    #[test]
    fn tool_call_delta_opens_new_content_block() {
        let mut conv = OpenAiToAnthropicStream::new();
        let events = conv.process(chunk(
            vec![ChunkChoice {
                index: 0,
                delta: Delta {
                    role: None,
                    content: None,
                    tool_calls: Some(vec![ToolCallDelta {
                        index: 0,
                        id: Some("call_1".into()),
                        r#type: Some("function".into()),
                        function: Some(FunctionCallDelta { name: Some("get_weather".into()), arguments: None }),
                    }]),
                },
                finish_reason: None,
            }],
            None,
        ));
        assert!(events.iter().any(|e| matches!(e, StreamEvent::ContentBlockStart { content_block, .. } if content_block["type"] == "tool_use")));
    }

    #[test]
    fn finish_reason_with_usage_closes_blocks_and_stops() {
        let mut conv = OpenAiToAnthropicStream::new();
        conv.process(chunk(
            vec![ChunkChoice { index: 0, delta: Delta { role: None, content: Some("hi".into()), tool_calls: None }, finish_reason: None }],
            None,
        ));
        let events = conv.process(chunk(
            vec![ChunkChoice { index: 0, delta: Delta::default(), finish_reason: Some("stop".into()) }],
            Some(Usage { prompt_tokens: 5, completion_tokens: 7, total_tokens: 12 }),
        ));
        assert!(events.iter().any(|e| matches!(e, StreamEvent::ContentBlockStop { .. })));
        assert!(events.iter().any(|e| matches!(e, StreamEvent::MessageStop)));
        let delta_event = events.iter().find_map(|e| match e {
            StreamEvent::MessageDelta { delta, .. } => Some(delta),
            _ => None,
        });
        assert_eq!(delta_event.unwrap()["stop_reason"], "end_turn");
    }

    #[test]
    fn finish_reason_without_trailing_usage_chunk_flushes_on_finish() {
        let mut conv = OpenAiToAnthropicStream::new();
        conv.process(chunk(
            vec![ChunkChoice { index: 0, delta: Delta { role: None, content: Some("hi".into()), tool_calls: None }, finish_reason: None }],
            None,
        ));
        let events = conv.process(chunk(vec![ChunkChoice { index: 0, delta: Delta::default(), finish_reason: Some("stop".into()) }], None));
        assert!(events.is_empty(), "finish must be held back until usage or explicit finish()");

        let events = conv.finish();
        assert!(events.iter().any(|e| matches!(e, StreamEvent::MessageStop)));
    }
}
