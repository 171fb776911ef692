//! Request-shape translation between the Anthropic Messages API and the
//! OpenAI Chat Completions API (spec §4.G, both directions).

use relay_core::wire::{anthropic, openai};
use serde_json::Value;

const DEFAULT_MAX_TOKENS: u64 = 4096;

/// Anthropic request -> OpenAI request. `system` becomes a leading
/// `system` message; block-array messages split across `content`,
/// `tool_calls`, and synthetic `tool` messages; `thinking` blocks are
/// dropped (OpenAI has no equivalent on the request side).
#[must_use]
pub fn anthropic_to_openai_request(req: &anthropic::Request) -> openai::Request {
    let mut messages = Vec::new();

    if let Some(system) = &req.system {
        let text = match system {
            anthropic::SystemField::Text(s) => s.clone(),
            anthropic::SystemField::Blocks(blocks) => blocks
                .iter()
                .map(|b| b.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        };
        if !text.is_empty() {
            messages.push(openai::Message::text("system", text));
        }
    }

    for message in &req.messages {
        messages.extend(anthropic_message_to_openai(message));
    }

    openai::Request {
        model: req.model.clone(),
        messages,
        max_tokens: req.max_tokens,
        max_completion_tokens: None,
        temperature: req.temperature,
        top_p: req.top_p,
        stream: req.stream,
        stop: req.stop_sequences.clone(),
        tools: req.tools.as_ref().map(|tools| tools.iter().map(anthropic_tool_to_openai).collect()),
        tool_choice: req.tool_choice.as_ref().map(anthropic_tool_choice_to_openai),
        stream_options: req.stream.unwrap_or(false).then(|| openai::StreamOptions { include_usage: true }),
        extra: serde_json::Map::new(),
    }
}

fn anthropic_message_to_openai(message: &anthropic::Message) -> Vec<openai::Message> {
    match &message.content {
        anthropic::MessageContent::Text(text) => vec![openai::Message::text(message.role.clone(), text.clone())],
        anthropic::MessageContent::Blocks(blocks) => {
            let mut text_parts = Vec::new();
            let mut tool_calls = Vec::new();
            let mut extra_messages = Vec::new();

            for block in blocks {
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
                    anthropic::ContentBlock::ToolResult { tool_use_id, content, .. } => {
                        let text = tool_result_content_to_string(content.as_ref());
                        extra_messages.push(openai::Message {
                            role: "tool".to_owned(),
                            content: Some(text),
                            tool_calls: None,
                            tool_call_id: Some(tool_use_id.clone()),
                            name: None,
                        });
                    }
                    anthropic::ContentBlock::Thinking { .. } => {}
                }
            }

            let mut out = Vec::new();
            if !text_parts.is_empty() || !tool_calls.is_empty() {
                out.push(openai::Message {
                    role: message.role.clone(),
                    content: (!text_parts.is_empty()).then(|| text_parts.join("")),
                    tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                    tool_call_id: None,
                    name: None,
                });
            }
            out.extend(extra_messages);
            out
        }
    }
}

fn tool_result_content_to_string(content: Option<&anthropic::ToolResultContent>) -> String {
    match content {
        None => String::new(),
        Some(anthropic::ToolResultContent::Text(text)) => text.clone(),
        Some(anthropic::ToolResultContent::Blocks(blocks)) => blocks
            .iter()
            .filter_map(|b| match b {
                anthropic::ContentBlock::Text { text } => Some(text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn anthropic_tool_to_openai(tool: &anthropic::Tool) -> openai::Tool {
    openai::Tool {
        tool_type: "function".to_owned(),
        function: openai::FunctionDef {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.input_schema.clone(),
        },
    }
}

fn anthropic_tool_choice_to_openai(choice: &anthropic::ToolChoice) -> openai::ToolChoice {
    match choice {
        anthropic::ToolChoice::Mode(mode) if mode == "auto" => openai::ToolChoice::Mode("auto".to_owned()),
        anthropic::ToolChoice::Mode(mode) if mode == "any" => openai::ToolChoice::Mode("required".to_owned()),
        anthropic::ToolChoice::Mode(mode) => openai::ToolChoice::Mode(mode.clone()),
        anthropic::ToolChoice::Named { name, .. } => openai::ToolChoice::Named {
            r#type: "function".to_owned(),
            function: openai::NamedFunction { name: name.clone() },
        },
    }
}

/// OpenAI request -> Anthropic request, the inverse of the above. System
/// messages collapse into the `system` array; assistant `tool_calls`
/// become `tool_use` blocks; `tool` messages become a `user` message
/// whose content is a single `tool_result` block.
#[must_use]
pub fn openai_to_anthropic_request(req: &openai::Request) -> anthropic::Request {
    let mut system_texts = Vec::new();
    let mut messages = Vec::new();

    for message in &req.messages {
        if message.role == "system" {
            if let Some(content) = &message.content {
                system_texts.push(content.clone());
            }
            continue;
        }
        messages.push(openai_message_to_anthropic(message));
    }

    let system = (!system_texts.is_empty()).then(|| {
        anthropic::SystemField::Blocks(
            system_texts
                .into_iter()
                .map(|text| anthropic::TextBlock { block_type: "text".to_owned(), text })
                .collect(),
        )
    });

    let max_tokens = req.max_tokens.or(req.max_completion_tokens).unwrap_or(DEFAULT_MAX_TOKENS);

    anthropic::Request {
        model: req.model.clone(),
        messages,
        system,
        max_tokens: Some(max_tokens),
        temperature: req.temperature,
        top_p: req.top_p,
        stream: req.stream,
        stop_sequences: req.stop.clone(),
        tools: req.tools.as_ref().map(|tools| tools.iter().map(openai_tool_to_anthropic).collect()),
        tool_choice: req.tool_choice.as_ref().map(openai_tool_choice_to_anthropic),
        extra: serde_json::Map::new(),
    }
}

fn openai_message_to_anthropic(message: &openai::Message) -> anthropic::Message {
    if message.role == "tool" {
        let tool_use_id = message.tool_call_id.clone().unwrap_or_default();
        let content = message.content.clone().unwrap_or_default();
        return anthropic::Message {
            role: "user".to_owned(),
            content: anthropic::MessageContent::Blocks(vec![anthropic::ContentBlock::ToolResult {
                tool_use_id,
                content: Some(anthropic::ToolResultContent::Text(content)),
                is_error: None,
            }]),
        };
    }

    if let Some(tool_calls) = &message.tool_calls {
        let mut blocks = Vec::new();
        if let Some(text) = &message.content {
            if !text.is_empty() {
                blocks.push(anthropic::ContentBlock::Text { text: text.clone() });
            }
        }
        for call in tool_calls {
            let input: Value = serde_json::from_str(&call.function.arguments).unwrap_or(Value::Object(serde_json::Map::new()));
            blocks.push(anthropic::ContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.function.name.clone(),
                input,
            });
        }
        return anthropic::Message { role: message.role.clone(), content: anthropic::MessageContent::Blocks(blocks) };
    }

    anthropic::Message {
        role: message.role.clone(),
        content: anthropic::MessageContent::Text(message.content.clone().unwrap_or_default()),
    }
}

fn openai_tool_to_anthropic(tool: &openai::Tool) -> anthropic::Tool {
    anthropic::Tool {
        name: tool.function.name.clone(),
        description: tool.function.description.clone(),
        input_schema: tool.function.parameters.clone(),
    }
}

fn openai_tool_choice_to_anthropic(choice: &openai::ToolChoice) -> anthropic::ToolChoice {
    match choice {
        openai::ToolChoice::Mode(mode) if mode == "required" => anthropic::ToolChoice::Mode("any".to_owned()),
        openai::ToolChoice::Mode(mode) => anthropic::ToolChoice::Mode(mode.clone()),
        openai::ToolChoice::Named { function, .. } => {
            anthropic::ToolChoice::Named { r#type: "tool".to_owned(), name: function.name.clone() }
        }
    }
}
