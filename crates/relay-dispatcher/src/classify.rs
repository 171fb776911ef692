use relay_core::InboundShape;

/// Classify the inbound path per spec §4.H step 2: `/chat/completions`
/// anywhere in the path means OpenAI shape, everything else is treated
/// as the native Anthropic Messages shape.
#[must_use]
pub fn classify_path(path: &str) -> InboundShape {
    if path.contains("/chat/completions") {
        InboundShape::OpenAi
    } else {
        InboundShape::Anthropic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_completions_path_is_openai() {
        assert_eq!(classify_path("/v1/chat/completions"), InboundShape::OpenAi);
    }

    #[test]
    fn messages_path_is_anthropic() {
        assert_eq!(classify_path("/v1/messages"), InboundShape::Anthropic);
        assert_eq!(classify_path("/v1/messages/count_tokens"), InboundShape::Anthropic);
    }
}
