use once_cell::sync::Lazy;
use regex::Regex;

static VERSION_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"/v[0-9]+$").expect("static regex"));

/// Build the chat-completions URL for an OpenAI-shaped base URL,
/// adjusting for the non-standard version prefixes the spec calls out:
/// Gemini's `/v1beta/openai/` and base URLs that already end in `/vN`
/// (where appending another `/v1` would double up the prefix).
#[must_use]
pub fn build_chat_completions_url(base: &str) -> String {
    let trimmed = base.trim_end_matches('/');
    if trimmed.contains("generativelanguage.googleapis.com") {
        return format!("{trimmed}/v1beta/openai/chat/completions");
    }
    if VERSION_SUFFIX.is_match(trimmed) {
        return format!("{trimmed}/chat/completions");
    }
    format!("{trimmed}/v1/chat/completions")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemini_base_gets_v1beta_openai_prefix() {
        let url = build_chat_completions_url("https://generativelanguage.googleapis.com");
        assert_eq!(url, "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions");
    }

    #[test]
    fn base_already_ending_in_version_skips_extra_v1() {
        let url = build_chat_completions_url("https://api.deepseek.com/v1");
        assert_eq!(url, "https://api.deepseek.com/v1/chat/completions");
    }

    #[test]
    fn plain_base_gets_v1_inserted() {
        let url = build_chat_completions_url("https://api.openai.com");
        assert_eq!(url, "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn trailing_slash_is_tolerated() {
        let url = build_chat_completions_url("https://openrouter.ai/api/v1/");
        assert_eq!(url, "https://openrouter.ai/api/v1/chat/completions");
    }
}
