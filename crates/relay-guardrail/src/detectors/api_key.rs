use once_cell::sync::Lazy;
use regex::Regex;

use crate::detector::{Category, Detector, DetectorMeta, Phase};
use crate::detectors::entropy::{is_kebab_case_identifier, looks_like_secret};
use crate::reverse_map::ReverseMap;
use relay_crypto::TokenCodec;

/// Known vendor key prefixes. Not exhaustive of every SaaS on earth, but
/// wide enough to catch what shows up in real request bodies: LLM
/// providers, cloud platforms, payment processors, chat/webhook
/// integrations, and common dev-tool PATs.
const VENDOR_PREFIXES: &[&str] = &[
    "sk-ant-", "sk-proj-", "sk-", "pk_live_", "pk_test_", "sk_live_", "sk_test_", "rk_live_",
    "ghp_", "gho_", "ghu_", "ghs_", "ghr_", "github_pat_", "glpat-", "npm_", "dop_v1_",
    "xoxb-", "xoxa-", "xoxp-", "xoxr-", "xoxs-", "xapp-", "AIza", "ya29.", "EAACEdEose0cBA",
    "SG.", "SK", "AC", "shpat_", "shpss_", "shpca_", "sq0atp-", "sq0csp-", "key-", "api-",
    "Bearer ", "AKID", "SECRET", "client_secret_", "whsec_", "rzp_live_", "rzp_test_",
    "sl.", "figo_", "hf_", "do_v1_", "tfp_",
];

static CONTEXT_REGEX: Lazy<Regex> = Lazy::new(|| {
    let escaped = VENDOR_PREFIXES
        .iter()
        .map(|p| regex::escape(p))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?:{escaped})[A-Za-z0-9_\-]{{8,}}")).expect("valid regex")
});

static STANDALONE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9_+/=-]{20,}").expect("valid regex"));

pub struct ApiKeyDetector {
    meta: DetectorMeta,
}

impl ApiKeyDetector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            meta: DetectorMeta {
                id: "api-key",
                display_name: "API key",
                category: Category::Credentials,
                priority: 3,
                phases: &[Phase::PreCall],
                default_enabled: true,
            },
        }
    }
}

impl Default for ApiKeyDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn looks_like_file_path(text: &str, start: usize) -> bool {
    let before = &text[..start];
    before.ends_with('/') || before.ends_with('\\')
}

impl Detector for ApiKeyDetector {
    fn meta(&self) -> &DetectorMeta {
        &self.meta
    }

    fn execute(&self, text: &str, codec: &TokenCodec, reverse_map: &ReverseMap) -> (String, usize) {
        let mut spans: Vec<(usize, usize)> = CONTEXT_REGEX.find_iter(text).map(|m| (m.start(), m.end())).collect();

        for m in STANDALONE_TOKEN.find_iter(text) {
            if spans.iter().any(|&(s, e)| m.start() < e && s < m.end()) {
                continue;
            }
            let token = m.as_str();
            if is_kebab_case_identifier(token) || looks_like_file_path(text, m.start()) {
                continue;
            }
            if looks_like_secret(token) {
                spans.push((m.start(), m.end()));
            }
        }
        spans.sort_unstable();

        let mut out = String::with_capacity(text.len());
        let mut last_end = 0usize;
        let mut count = 0usize;
        for (start, end) in spans {
            if start < last_end {
                continue;
            }
            out.push_str(&text[last_end..start]);
            let token = &text[start..end];
            let bucket = if token.len() <= 24 {
                "short"
            } else if token.len() <= 48 {
                "med"
            } else {
                "long"
            };
            let digest = codec.hmac_short(token, 12);
            let replacement = format!("[SECRET-{bucket}-{digest}]");
            reverse_map.insert(replacement.clone(), token.to_owned());
            out.push_str(&replacement);
            last_end = end;
            count += 1;
        }
        out.push_str(&text[last_end..]);

        (out, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_crypto::Key;

    fn codec() -> TokenCodec {
        TokenCodec::new(Key::from_bytes([16u8; 32]))
    }

    #[test]
    fn replaces_known_vendor_prefix() {
        let d = ApiKeyDetector::new();
        let map = ReverseMap::new();
        let (out, n) = d.execute("token sk-ant-abcdefghijklmnop used here", &codec(), &map);
        assert_eq!(n, 1);
        assert!(out.contains("[SECRET-"));
        assert!(!out.contains("sk-ant-abcdefghijklmnop"));
    }

    #[test]
    fn ignores_kebab_case_identifier() {
        let d = ApiKeyDetector::new();
        let map = ReverseMap::new();
        let (out, n) = d.execute("feature flag is my-long-feature-flag-name-here", &codec(), &map);
        assert_eq!(n, 0);
        assert_eq!(out, "feature flag is my-long-feature-flag-name-here");
    }

    #[test]
    fn ignores_file_path_segment() {
        let d = ApiKeyDetector::new();
        let map = ReverseMap::new();
        let (_, n) = d.execute("see /usr/lib/x86_64-linux-gnu/libssl.so.3.0.abcdefgh", &codec(), &map);
        assert_eq!(n, 0);
    }

    #[test]
    fn flags_high_entropy_standalone_token() {
        let d = ApiKeyDetector::new();
        let map = ReverseMap::new();
        let (out, n) = d.execute("secret=Xk9mQ2pL8vR4zN7wS1tYh6bC3dF5gJ0", &codec(), &map);
        assert!(n >= 1);
        assert!(out.contains("[SECRET-"));
    }
}
