use once_cell::sync::Lazy;
use regex::Regex;

use crate::detector::{Category, Detector, DetectorMeta, Phase};
use crate::detectors::entropy::looks_like_secret;
use crate::reverse_map::ReverseMap;
use relay_crypto::TokenCodec;

const KEYWORDS: &[&str] = &[
    "password", "passwd", "pwd", "pass", "secret", "token", "apikey", "api_key", "api-key",
    "credential", "auth", "authorization", "private_key", "private-key", "access_key",
    "access-key", "client_secret", "client-secret", "session", "cookie", "bearer", "pin",
    "passphrase", "secretkey", "secret_key", "secret-key", "masterkey", "master_key",
    "encryption_key", "signing_key",
];

static KEYWORD_ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    let escaped = KEYWORDS.iter().map(|k| regex::escape(k)).collect::<Vec<_>>().join("|");
    Regex::new(&format!(
        r"(?i)\b(?:{escaped})\b\s*(?:=|:|\bis\b|\bwas\b|\bset to\b)\s*['\x22]?([^\s'\x22,;]{{4,}})['\x22]?"
    ))
    .expect("valid regex")
});

static ENV_ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b([A-Z_][A-Z0-9_]*(?:PASSWORD|SECRET|TOKEN|KEY|CREDENTIAL)[A-Z0-9_]*)\s*=\s*([^\s]+)")
        .expect("valid regex")
});

static STANDALONE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9_+/=-]{20,}").expect("valid regex"));

pub struct PasswordDetector {
    meta: DetectorMeta,
}

impl PasswordDetector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            meta: DetectorMeta {
                id: "password",
                display_name: "Password or secret assignment",
                category: Category::Credentials,
                priority: 4,
                phases: &[Phase::PreCall],
                default_enabled: true,
            },
        }
    }
}

impl Default for PasswordDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn replace_value(text: &str, value_start: usize, value_end: usize, codec: &TokenCodec, reverse_map: &ReverseMap, out: &mut String, count: &mut usize) {
    let value = &text[value_start..value_end];
    let digest = codec.hmac_short(value, 12);
    let replacement = format!("[SECRET-med-{digest}]");
    reverse_map.insert(replacement.clone(), value.to_owned());
    out.push_str(&replacement);
    *count += 1;
}

impl Detector for PasswordDetector {
    fn meta(&self) -> &DetectorMeta {
        &self.meta
    }

    fn execute(&self, text: &str, codec: &TokenCodec, reverse_map: &ReverseMap) -> (String, usize) {
        let mut spans: Vec<(usize, usize)> = Vec::new();

        for caps in KEYWORD_ASSIGNMENT.captures_iter(text) {
            if let Some(g) = caps.get(1) {
                spans.push((g.start(), g.end()));
            }
        }
        for caps in ENV_ASSIGNMENT.captures_iter(text) {
            if let Some(g) = caps.get(2) {
                spans.push((g.start(), g.end()));
            }
        }

        for m in STANDALONE_TOKEN.find_iter(text) {
            if spans.iter().any(|&(s, e)| m.start() < e && s < m.end()) {
                continue;
            }
            if looks_like_secret(m.as_str()) {
                spans.push((m.start(), m.end()));
            }
        }

        spans.sort_unstable();
        spans.dedup();

        let mut out = String::with_capacity(text.len());
        let mut last_end = 0usize;
        let mut count = 0usize;
        for (start, end) in spans {
            if start < last_end {
                continue;
            }
            out.push_str(&text[last_end..start]);
            replace_value(text, start, end, codec, reverse_map, &mut out, &mut count);
            last_end = end;
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
        TokenCodec::new(Key::from_bytes([17u8; 32]))
    }

    #[test]
    fn redacts_keyword_assignment() {
        let d = PasswordDetector::new();
        let map = ReverseMap::new();
        let (out, n) = d.execute("password = hunter2fallback", &codec(), &map);
        assert_eq!(n, 1);
        assert!(out.contains("[SECRET-"));
        assert!(!out.contains("hunter2fallback"));
    }

    #[test]
    fn redacts_env_style_assignment() {
        let d = PasswordDetector::new();
        let map = ReverseMap::new();
        let (out, n) = d.execute("DB_SECRET_TOKEN=abc123verysecretvalue", &codec(), &map);
        assert_eq!(n, 1);
        assert!(out.contains("[SECRET-"));
    }

    #[test]
    fn handles_is_and_set_to_phrasing() {
        let d = PasswordDetector::new();
        let map = ReverseMap::new();
        let (out, n) = d.execute("the api key is abcdef1234567890", &codec(), &map);
        assert_eq!(n, 1);
        assert!(out.contains("[SECRET-"));
    }
}
