//! Bridge between the OpenAI Chat Completions dialect relay accepts
//! internally and the Codex-subscription `Responses` API, which differs
//! enough (instructions + typed input items + tools, distinct SSE event
//! types) to warrant its own small translator rather than reusing the
//! Anthropic<->OpenAI converters.

use relay_core::wire::openai;
use serde_json::{Value, json};
use std::collections::HashMap;

/// Translate a relay-internal (Anthropic-shaped-turned-OpenAI) chat
/// completions request into a Responses API request body. System
/// messages collapse into `instructions`; the rest become typed `input`
/// items.
#[must_use]
pub fn chat_completions_to_responses(req: &openai::Request) -> Value {
    let mut instructions = Vec::new();
    let mut input = Vec::new();

    for message in &req.messages {
        if message.role == "system" {
            if let Some(content) = &message.content {
                instructions.push(content.clone());
            }
            continue;
        }
        if message.role == "tool" {
            input.push(json!({
                "type": "function_call_output",
                "call_id": message.tool_call_id,
                "output": message.content.clone().unwrap_or_default(),
            }));
            continue;
        }
        if let Some(tool_calls) = &message.tool_calls {
            for call in tool_calls {
                input.push(json!({
                    "type": "function_call",
                    "call_id": call.id,
                    "name": call.function.name,
                    "arguments": call.function.arguments,
                }));
            }
            continue;
        }
        input.push(json!({
            "type": "message",
            "role": message.role,
            "content": [{"type": "input_text", "text": message.content.clone().unwrap_or_default()}],
        }));
    }

    let tools: Vec<Value> = req
        .tools
        .iter()
        .flatten()
        .map(|tool| json!({"type": "function", "name": tool.function.name, "description": tool.function.description, "parameters": tool.function.parameters}))
        .collect();

    json!({
        "model": req.model,
        "instructions": instructions.join("\n"),
        "input": input,
        "tools": tools,
        "stream": req.stream.unwrap_or(false),
        "max_output_tokens": req.max_tokens.or(req.max_completion_tokens),
        "temperature": req.temperature,
    })
}

/// Translate a buffered (non-streamed) Responses API response body back
/// into an OpenAI Chat Completions response, the non-streaming mirror of
/// [`CodexResponsesStream`]. `id`/`model` come from the caller since a
/// buffered Responses body doesn't necessarily echo either in a place
/// this function can rely on.
#[must_use]
pub fn responses_to_chat_completions(body: &Value, id: &str, model: &str) -> openai::Response {
    let mut content = String::new();
    let mut tool_calls = Vec::new();

    for item in body.get("output").and_then(Value::as_array).into_iter().flatten() {
        match item.get("type").and_then(Value::as_str) {
            Some("message") => {
                for block in item.get("content").and_then(Value::as_array).into_iter().flatten() {
                    if let Some(text) = block.get("text").and_then(Value::as_str) {
                        content.push_str(text);
                    }
                }
            }
            Some("function_call") => {
                let call_id = item.get("call_id").and_then(Value::as_str).unwrap_or_default().to_owned();
                let name = item.get("name").and_then(Value::as_str).unwrap_or_default().to_owned();
                let arguments = item.get("arguments").and_then(Value::as_str).unwrap_or_default().to_owned();
                tool_calls.push(openai::ToolCall { id: call_id, call_type: "function".to_owned(), function: openai::FunctionCall { name, arguments } });
            }
            _ => {}
        }
    }

    let finish_reason = if tool_calls.is_empty() { "stop" } else { "tool_calls" };
    let message = openai::Message {
        role: "assistant".to_owned(),
        content: (!content.is_empty()).then_some(content),
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        tool_call_id: None,
        name: None,
    };

    let usage = body.get("usage").map(|u| {
        let input_tokens = u.get("input_tokens").and_then(Value::as_u64).unwrap_or(0);
        let output_tokens = u.get("output_tokens").and_then(Value::as_u64).unwrap_or(0);
        openai::Usage { prompt_tokens: input_tokens, completion_tokens: output_tokens, total_tokens: input_tokens + output_tokens }
    });

    openai::Response {
        id: id.to_owned(),
        object: "chat.completion".to_owned(),
        model: model.to_owned(),
        choices: vec![openai::Choice { index: 0, message, finish_reason: Some(finish_reason.to_owned()) }],
        usage,
    }
}

/// Streams Responses API SSE events back out as OpenAI `chat.completion.chunk`
/// events. Only the event types the spec names are handled; anything else
/// passes through as a no-op.
pub struct CodexResponsesStream {
    id: String,
    model: String,
    next_index: usize,
    tool_indices: HashMap<String, usize>,
    wrote_role_preamble: bool,
}

impl CodexResponsesStream {
    #[must_use]
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self { id: id.into(), model: model.into(), next_index: 0, tool_indices: HashMap::new(), wrote_role_preamble: false }
    }

    fn chunk(&self, choices: Vec<openai::ChunkChoice>, usage: Option<openai::Usage>) -> openai::StreamChunk {
        openai::StreamChunk { id: self.id.clone(), object: "chat.completion.chunk".to_owned(), model: self.model.clone(), choices, usage }
    }

    fn role_preamble(&mut self) -> Vec<openai::StreamChunk> {
        if self.wrote_role_preamble {
            return Vec::new();
        }
        self.wrote_role_preamble = true;
        vec![self.chunk(
            vec![openai::ChunkChoice { index: 0, delta: openai::Delta { role: Some("assistant".to_owned()), content: None, tool_calls: None }, finish_reason: None }],
            None,
        )]
    }

    /// Process one decoded Responses API event (the JSON object carried
    /// in the `data:` line).
    pub fn process(&mut self, event_type: &str, data: &Value) -> Vec<openai::StreamChunk> {
        match event_type {
            "response.output_text.delta" => {
                let Some(text) = data.get("delta").and_then(Value::as_str) else { return Vec::new() };
                let mut out = self.role_preamble();
                out.push(self.chunk(
                    vec![openai::ChunkChoice { index: 0, delta: openai::Delta { role: None, content: Some(text.to_owned()), tool_calls: None }, finish_reason: None }],
                    None,
                ));
                out
            }
            // Reasoning-summary text has no Chat Completions field to carry it in;
            // dropped here, matching what a non-reasoning-aware OpenAI client expects.
            "response.reasoning_summary_text.delta" => Vec::new(),
            "response.output_item.done" => self.handle_output_item_done(data),
            "response.completed" => self.handle_completed(data),
            _ => Vec::new(),
        }
    }

    fn handle_output_item_done(&mut self, data: &Value) -> Vec<openai::StreamChunk> {
        let Some(item) = data.get("item") else { return Vec::new() };
        if item.get("type").and_then(Value::as_str) != Some("function_call") {
            return Vec::new();
        }
        let call_id = item.get("call_id").and_then(Value::as_str).unwrap_or_default().to_owned();
        let name = item.get("name").and_then(Value::as_str).unwrap_or_default().to_owned();
        let arguments = item.get("arguments").and_then(Value::as_str).unwrap_or_default().to_owned();

        let index = *self.tool_indices.entry(call_id.clone()).or_insert_with(|| {
            let i = self.next_index;
            self.next_index += 1;
            i
        });

        let mut out = self.role_preamble();
        out.push(self.chunk(
            vec![openai::ChunkChoice {
                index: 0,
                delta: openai::Delta {
                    role: None,
                    content: None,
                    tool_calls: Some(vec![openai::ToolCallDelta {
                        index,
                        id: Some(call_id),
                        r#type: Some("function".to_owned()),
                        function: Some(openai::FunctionCallDelta { name: Some(name), arguments: Some(arguments) }),
                    }]),
                },
                finish_reason: None,
            }],
            None,
        ));
        out
    }

    fn handle_completed(&mut self, data: &Value) -> Vec<openai::StreamChunk> {
        let finish_reason = if self.tool_indices.is_empty() { "stop" } else { "tool_calls" };
        let mut out = vec![self.chunk(vec![openai::ChunkChoice { index: 0, delta: openai::Delta::default(), finish_reason: Some(finish_reason.to_owned()) }], None)];

        if let Some(usage) = data.get("response").and_then(|r| r.get("usage")) {
            let input_tokens = usage.get("input_tokens").and_then(Value::as_u64).unwrap_or(0);
            let output_tokens = usage.get("output_tokens").and_then(Value::as_u64).unwrap_or(0);
            out.push(self.chunk(Vec::new(), Some(openai::Usage { prompt_tokens: input_tokens, completion_tokens: output_tokens, total_tokens: input_tokens + output_tokens })));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_messages_collapse_into_instructions() {
        let req = openai::Request {
            model: "gpt-5-codex".into(),
            messages: vec![openai::Message::text("system", "be terse"), openai::Message::text("user", "hi")],
            max_tokens: None,
            max_completion_tokens: None,
            temperature: None,
            top_p: None,
            stream: Some(true),
            stop: None,
            tools: None,
            tool_choice: None,
            stream_options: None,
            extra: serde_json::Map::new(),
        };
        let responses_req = chat_completions_to_responses(&req);
        assert_eq!(responses_req["instructions"], "be terse");
        assert_eq!(responses_req["input"][0]["type"], "message");
    }

    #[test]
    fn tool_message_becomes_function_call_output() {
        let req = openai::Request {
            model: "gpt-5-codex".into(),
            messages: vec![openai::Message { role: "tool".into(), content: Some("72F".into()), tool_calls: None, tool_call_id: Some("call_1".into()), name: None }],
            max_tokens: None,
            max_completion_tokens: None,
            temperature: None,
            top_p: None,
            stream: None,
            stop: None,
            tools: None,
            tool_choice: None,
            stream_options: None,
            extra: serde_json::Map::new(),
        };
        let responses_req = chat_completions_to_responses(&req);
        assert_eq!(responses_req["input"][0]["type"], "function_call_output");
        assert_eq!(responses_req["input"][0]["call_id"], "call_1");
    }

    #[test]
    fn output_text_delta_emits_content_chunk_with_role_preamble() {
        let mut stream = CodexResponsesStream::new("resp_1", "gpt-5-codex");
        let chunks = stream.process("response.output_text.delta", &json!({"delta": "hello"}));
        assert_eq!(chunks[0].choices[0].delta.role.as_deref(), Some("assistant"));
        assert_eq!(chunks[1].choices[0].delta.content.as_deref(), Some("hello"));
    }

    #[test]
    fn function_call_item_done_emits_tool_call_chunk() {
        let mut stream = CodexResponsesStream::new("resp_1", "gpt-5-codex");
        let chunks = stream.process(
            "response.output_item.done",
            &json!({"item": {"type": "function_call", "call_id": "call_1", "name": "get_weather", "arguments": "{\"city\":\"nyc\"}"}}),
        );
        let tool_chunk = chunks.iter().find(|c| c.choices[0].delta.tool_calls.is_some()).unwrap();
        let call = &tool_chunk.choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.id.as_deref(), Some("call_1"));
        assert_eq!(call.function.as_ref().unwrap().arguments.as_deref(), Some("{\"city\":\"nyc\"}"));
    }

    #[test]
    fn completed_emits_finish_reason_and_usage() {
        let mut stream = CodexResponsesStream::new("resp_1", "gpt-5-codex");
        let chunks = stream.process("response.completed", &json!({"response": {"usage": {"input_tokens": 10, "output_tokens": 5}}}));
        assert_eq!(chunks[0].choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(chunks[1].usage.as_ref().unwrap().total_tokens, 15);
    }

    #[test]
    fn reasoning_summary_delta_is_dropped() {
        let mut stream = CodexResponsesStream::new("resp_1", "gpt-5-codex");
        let chunks = stream.process("response.reasoning_summary_text.delta", &json!({"delta": "thinking..."}));
        assert!(chunks.is_empty());
    }

    #[test]
    fn buffered_response_collects_message_text() {
        let body = json!({
            "output": [{"type": "message", "content": [{"type": "output_text", "text": "hello there"}]}],
            "usage": {"input_tokens": 4, "output_tokens": 2},
        });
        let resp = responses_to_chat_completions(&body, "resp_1", "gpt-5-codex");
        assert_eq!(resp.choices[0].message.content.as_deref(), Some("hello there"));
        assert_eq!(resp.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(resp.usage.as_ref().unwrap().total_tokens, 6);
    }

    #[test]
    fn buffered_response_collects_function_call() {
        let body = json!({
            "output": [{"type": "function_call", "call_id": "call_1", "name": "get_weather", "arguments": "{\"city\":\"nyc\"}"}],
        });
        let resp = responses_to_chat_completions(&body, "resp_1", "gpt-5-codex");
        assert_eq!(resp.choices[0].finish_reason.as_deref(), Some("tool_calls"));
        let call = &resp.choices[0].message.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.function.arguments, "{\"city\":\"nyc\"}");
    }
}
