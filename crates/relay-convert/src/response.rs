//! Buffered (non-streamed) response translation, both directions.

use relay_core::wire::{anthropic, openai};

/// Anthropic response -> OpenAI response. Always a single choice at
/// index 0; `text` blocks join into `message.content`, `tool_use` blocks
/// become `tool_calls`.
#[must_use]
pub fn anthropic_to_openai_response(resp: &anthropic::Response) -> openai::Response {
    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();

    for block in &resp.content {
        match block {
            anthropic::ContentBlock::Text { text } => text_parts.push(text.clone()),
            anthropic::ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(openai::ToolCall {
                    id: id.clone(),
                    call_type: "function".to_owned(),
                    function: openai::FunctionCall {
                        name: name.clone(),
                        arguments: serde_json::to_string(input).unwrap_or_default(),
                    },
                });
            }
            anthropic::ContentBlock::ToolResult { .. } | anthropic::ContentBlock::Thinking { .. } => {}
        }
    }

    let message = openai::Message {
        role: "assistant".to_owned(),
        content: (!text_parts.is_empty()).then(|| text_parts.join("")),
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        tool_call_id: None,
        name: None,
    };

    openai::Response {
        id: resp.id.clone(),
        object: "chat.completion".to_owned(),
        model: resp.model.clone(),
        choices: vec![openai::Choice {
            index: 0,
            message,
            finish_reason: resp.stop_reason.as_deref().map(anthropic_stop_reason_to_openai),
        }],
        usage: Some(openai::Usage {
            prompt_tokens: resp.usage.input_tokens,
            completion_tokens: resp.usage.output_tokens,
            total_tokens: resp.usage.input_tokens + resp.usage.output_tokens,
        }),
    }
}

fn anthropic_stop_reason_to_openai(reason: &str) -> String {
    match reason {
        "end_turn" => "stop",
        "tool_use" => "tool_calls",
        "max_tokens" => "length",
        "stop_sequence" => "stop",
        other => other,
    }
    .to_owned()
}

/// OpenAI response -> Anthropic response, the inverse of the above. A
/// tool-call whose arguments fail to parse as JSON is carried through as
/// `{"_raw": "<string>"}` rather than failing the whole conversion.
#[must_use]
pub fn openai_to_anthropic_response(resp: &openai::Response) -> anthropic::Response {
    let choice = resp.choices.first();
    let mut content = Vec::new();

    if let Some(choice) = choice {
        if let Some(text) = &choice.message.content {
            if !text.is_empty() {
                content.push(anthropic::ContentBlock::Text { text: text.clone() });
            }
        }
        if let Some(tool_calls) = &choice.message.tool_calls {
            for call in tool_calls {
                let input = serde_json::from_str(&call.function.arguments)
                    .unwrap_or_else(|_| serde_json::json!({ "_raw": call.function.arguments }));
                content.push(anthropic::ContentBlock::ToolUse { id: call.id.clone(), name: call.function.name.clone(), input });
            }
        }
    }

    let stop_reason = choice.and_then(|c| c.finish_reason.as_deref()).map(openai_finish_reason_to_anthropic);

    anthropic::Response {
        id: resp.id.clone(),
        response_type: "message".to_owned(),
        role: "assistant".to_owned(),
        model: resp.model.clone(),
        content,
        stop_reason,
        stop_sequence: None,
        usage: anthropic::Usage {
            input_tokens: resp.usage.as_ref().map_or(0, |u| u.prompt_tokens),
            output_tokens: resp.usage.as_ref().map_or(0, |u| u.completion_tokens),
            cache_creation_input_tokens: 0,
            cache_read_input_tokens: 0,
        },
    }
}

fn openai_finish_reason_to_anthropic(reason: &str) -> String {
    match reason {
        "stop" => "end_turn",
        "length" => "max_tokens",
        "tool_calls" => "tool_use",
        other => other,
    }
    .to_owned()
}
