//! Walks an Anthropic-shaped request body and anonymises every scanned
//! text span in place; the inverse pass deanonymises a complete response
//! buffer.

use relay_core::wire::anthropic::{ContentBlock, MessageContent, Request, SystemField, ToolResultContent};
use relay_crypto::TokenCodec;

use crate::detector::Phase;
use crate::registry::{DetectorRegistry, GuardrailConfig};
use crate::reverse_map::ReverseMap;

/// Run every active pre-call detector over `text` in priority order,
/// threading the progressively-anonymised text through each one.
fn anonymise_text(
    text: &str,
    registry: &DetectorRegistry,
    config: &GuardrailConfig,
    codec: &TokenCodec,
    reverse_map: &ReverseMap,
) -> String {
    let mut current = text.to_owned();
    for detector in registry.active_for(Phase::PreCall, config) {
        let (next, _count) = detector.execute(&current, codec, reverse_map);
        current = next;
    }
    current
}

fn anonymise_system(system: &mut SystemField, registry: &DetectorRegistry, config: &GuardrailConfig, codec: &TokenCodec, reverse_map: &ReverseMap) {
    match system {
        SystemField::Text(text) => *text = anonymise_text(text, registry, config, codec, reverse_map),
        SystemField::Blocks(blocks) => {
            for block in blocks {
                block.text = anonymise_text(&block.text, registry, config, codec, reverse_map);
            }
        }
    }
}

fn anonymise_content_block(block: &mut ContentBlock, registry: &DetectorRegistry, config: &GuardrailConfig, codec: &TokenCodec, reverse_map: &ReverseMap) {
    match block {
        ContentBlock::Text { text } => {
            *text = anonymise_text(text, registry, config, codec, reverse_map);
        }
        ContentBlock::ToolUse { input, .. } => {
            anonymise_json_strings(input, registry, config, codec, reverse_map);
        }
        ContentBlock::ToolResult { content, .. } => {
            if let Some(content) = content {
                anonymise_tool_result_content(content, registry, config, codec, reverse_map);
            }
        }
        ContentBlock::Thinking { .. } => {
            // Carries a cryptographic signature; must pass through untouched.
        }
    }
}

fn anonymise_tool_result_content(content: &mut ToolResultContent, registry: &DetectorRegistry, config: &GuardrailConfig, codec: &TokenCodec, reverse_map: &ReverseMap) {
    match content {
        ToolResultContent::Text(text) => *text = anonymise_text(text, registry, config, codec, reverse_map),
        ToolResultContent::Blocks(blocks) => {
            for block in blocks {
                anonymise_content_block(block, registry, config, codec, reverse_map);
            }
        }
    }
}

/// Tool-call arguments are arbitrary JSON; recurse into every string leaf.
fn anonymise_json_strings(value: &mut serde_json::Value, registry: &DetectorRegistry, config: &GuardrailConfig, codec: &TokenCodec, reverse_map: &ReverseMap) {
    match value {
        serde_json::Value::String(s) => *s = anonymise_text(s, registry, config, codec, reverse_map),
        serde_json::Value::Array(items) => {
            for item in items {
                anonymise_json_strings(item, registry, config, codec, reverse_map);
            }
        }
        serde_json::Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                anonymise_json_strings(v, registry, config, codec, reverse_map);
            }
        }
        _ => {}
    }
}

/// Anonymise every scanned text span of `request` in place, recording
/// replacement -> original pairs in `reverse_map`.
pub fn anonymise_request(
    request: &mut Request,
    registry: &DetectorRegistry,
    config: &GuardrailConfig,
    codec: &TokenCodec,
    reverse_map: &ReverseMap,
) {
    if let Some(system) = &mut request.system {
        anonymise_system(system, registry, config, codec, reverse_map);
    }
    for message in &mut request.messages {
        match &mut message.content {
            MessageContent::Text(text) => {
                *text = anonymise_text(text, registry, config, codec, reverse_map);
            }
            MessageContent::Blocks(blocks) => {
                for block in blocks {
                    anonymise_content_block(block, registry, config, codec, reverse_map);
                }
            }
        }
    }
}

/// Deanonymise a complete (non-streamed) buffer. Tries the fixed match
/// order the spec lays out: vendor-prefix-bracket forms resolve through
/// `reverse_map` lookups uniformly, since every detector registers its
/// replacement there regardless of whether it also embeds a decryptable
/// token. `codec` is threaded through for detectors that could migrate to
/// embedded-token replacements without a reverse-map entry.
#[must_use]
pub fn deanonymise_buffer(text: &str, _codec: &TokenCodec, reverse_map: &ReverseMap) -> String {
    if reverse_map.is_empty() {
        return text.to_owned();
    }

    let mut out = text.to_owned();
    let mut pairs: Vec<(String, String)> = reverse_map.iter().collect();
    // Longest replacement first so `[IP-1.2.3.4-abcdef]` resolves before
    // its registered bare-quad sub-entry `1.2.3.4` would otherwise.
    pairs.sort_by_key(|(replacement, _)| std::cmp::Reverse(replacement.len()));
    for (replacement, original) in pairs {
        if out.contains(&replacement) {
            out = out.replace(&replacement, &original);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::wire::anthropic::Message;
    use relay_crypto::Key;

    fn codec() -> TokenCodec {
        TokenCodec::new(Key::from_bytes([20u8; 32]))
    }

    #[test]
    fn anonymises_system_string_and_message_text() {
        let registry = DetectorRegistry::with_defaults();
        let config = GuardrailConfig::default();
        let reverse_map = ReverseMap::new();
        let mut request = Request {
            model: "claude-3-5-sonnet".to_owned(),
            messages: vec![Message {
                role: "user".to_owned(),
                content: MessageContent::Text("email me at bob@example.com".to_owned()),
            }],
            system: Some(SystemField::Text("contact admin@example.com".to_owned())),
            max_tokens: None,
            temperature: None,
            top_p: None,
            stream: None,
            stop_sequences: None,
            tools: None,
            tool_choice: None,
            extra: serde_json::Map::new(),
        };

        anonymise_request(&mut request, &registry, &config, &codec(), &reverse_map);

        let SystemField::Text(system_text) = request.system.as_ref().unwrap() else {
            panic!("expected text system field");
        };
        assert!(system_text.contains("@anon.com"));
        let MessageContent::Text(message_text) = &request.messages[0].content else {
            panic!("expected text content");
        };
        assert!(message_text.contains("@anon.com"));
        assert!(!reverse_map.is_empty());
    }

    #[test]
    fn thinking_block_is_never_modified() {
        let registry = DetectorRegistry::with_defaults();
        let config = GuardrailConfig::default();
        let reverse_map = ReverseMap::new();
        let mut block = ContentBlock::Thinking {
            thinking: "the user's email bob@example.com needs a reply".to_owned(),
            signature: "sig-abc".to_owned(),
        };
        anonymise_content_block(&mut block, &registry, &config, &codec(), &reverse_map);
        match block {
            ContentBlock::Thinking { thinking, signature } => {
                assert!(thinking.contains("bob@example.com"));
                assert_eq!(signature, "sig-abc");
            }
            _ => panic!("expected thinking block"),
        }
    }

    #[test]
    fn deanonymise_restores_original() {
        let registry = DetectorRegistry::with_defaults();
        let config = GuardrailConfig::default();
        let reverse_map = ReverseMap::new();
        let anonymised = anonymise_text("reach alice@example.com now", &registry, &config, &codec(), &reverse_map);
        let restored = deanonymise_buffer(&anonymised, &codec(), &reverse_map);
        assert_eq!(restored, "reach alice@example.com now");
    }

    proptest::proptest! {
        #[test]
        fn anonymise_is_deterministic_across_fresh_state(local in "[a-z]{3,10}", domain in "[a-z]{3,8}") {
            let text = format!("contact {local}@{domain}.com about the invoice");
            let registry_a = DetectorRegistry::with_defaults();
            let reverse_map_a = ReverseMap::new();
            let out_a = anonymise_text(&text, &registry_a, &GuardrailConfig::default(), &codec(), &reverse_map_a);

            let registry_b = DetectorRegistry::with_defaults();
            let reverse_map_b = ReverseMap::new();
            let out_b = anonymise_text(&text, &registry_b, &GuardrailConfig::default(), &codec(), &reverse_map_b);

            prop_assert_eq!(out_a, out_b);
        }

        #[test]
        fn deanonymise_recovers_every_detected_span(local in "[a-z]{3,10}", domain in "[a-z]{3,8}") {
            let text = format!("contact {local}@{domain}.com about the invoice");
            let registry = DetectorRegistry::with_defaults();
            let reverse_map = ReverseMap::new();
            let anonymised = anonymise_text(&text, &registry, &GuardrailConfig::default(), &codec(), &reverse_map);
            let restored = deanonymise_buffer(&anonymised, &codec(), &reverse_map);
            prop_assert_eq!(restored, text);
        }
    }
}
