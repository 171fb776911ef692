use once_cell::sync::Lazy;
use regex::Regex;

use crate::detector::{Category, Detector, DetectorMeta, Phase};
use crate::detectors::dictionaries::{
    FAKE_FIRST_NAMES, FAKE_LAST_NAMES, FIRST_NAMES, GREETING_LEADS, LAST_NAMES, NAME_CONTEXT_PHRASES,
    STOP_WORDS,
};
use crate::reverse_map::ReverseMap;
use relay_crypto::TokenCodec;

static CAPITALIZED_PAIR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([A-Z][a-z]+)\s([A-Z][a-z]+)\b").expect("valid regex"));
static CAPITALIZED_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z][a-z]{2,}\b").expect("valid regex"));
static GREETING: Lazy<Regex> = Lazy::new(|| {
    let leads = GREETING_LEADS.join("|");
    Regex::new(&format!(r"(?i)\b(?:{leads})\b[, ]+([A-Z][a-z]+)")).expect("valid regex")
});
static CONTEXT: Lazy<Regex> = Lazy::new(|| {
    let phrases = NAME_CONTEXT_PHRASES
        .iter()
        .map(|p| regex::escape(p))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)(?:{phrases})\s+([A-Z][a-z]+)")).expect("valid regex")
});

/// Disabled by default: free-text name scanning over capitalised words is
/// inherently noisy (titles, brands, the first word of every sentence).
/// Four independent strategies vote on the same span so operators can
/// reason about which fired: known first+last pairs, a greeting lead-in,
/// an explicit self-introduction phrase, and a bare first-name dictionary
/// hit with stop-words excluded.
pub struct NameDetector {
    meta: DetectorMeta,
}

impl NameDetector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            meta: DetectorMeta {
                id: "name",
                display_name: "Personal name",
                category: Category::Pii,
                priority: 50,
                phases: &[Phase::PreCall],
                default_enabled: false,
            },
        }
    }
}

impl Default for NameDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn fake_name(codec: &TokenCodec, original: &str) -> String {
    let digest = codec.hmac_short(original, 8);
    let idx = u32::from_str_radix(&digest[..4], 16).unwrap_or(0) as usize;
    let first = FAKE_FIRST_NAMES[idx % FAKE_FIRST_NAMES.len()];
    let last = FAKE_LAST_NAMES[(idx / FAKE_FIRST_NAMES.len()) % FAKE_LAST_NAMES.len()];
    format!("{first} {last}")
}

fn is_known_name_word(word: &str) -> bool {
    FIRST_NAMES.contains(&word) || LAST_NAMES.contains(&word)
}

impl Detector for NameDetector {
    fn meta(&self) -> &DetectorMeta {
        &self.meta
    }

    fn execute(&self, text: &str, codec: &TokenCodec, reverse_map: &ReverseMap) -> (String, usize) {
        let mut spans: Vec<(usize, usize)> = Vec::new();

        for caps in CAPITALIZED_PAIR.captures_iter(text) {
            let first = &caps[1];
            let last = &caps[2];
            if is_known_name_word(first) && is_known_name_word(last) {
                let whole = caps.get(0).expect("group 0 present");
                spans.push((whole.start(), whole.end()));
            }
        }

        for caps in GREETING.captures_iter(text) {
            if let Some(g) = caps.get(1) {
                spans.push((g.start(), g.end()));
            }
        }

        for caps in CONTEXT.captures_iter(text) {
            if let Some(g) = caps.get(1) {
                spans.push((g.start(), g.end()));
            }
        }

        for m in CAPITALIZED_WORD.find_iter(text) {
            if spans.iter().any(|&(s, e)| m.start() < e && s < m.end()) {
                continue;
            }
            let lower = m.as_str().to_ascii_lowercase();
            if STOP_WORDS.contains(&lower.as_str()) {
                continue;
            }
            if FIRST_NAMES.contains(&m.as_str()) {
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
            let original = &text[start..end];
            let replacement = fake_name(codec, original);
            reverse_map.insert(replacement.clone(), original.to_owned());
            out.push_str(&replacement);
            last_end = end;
            count += 1;
        }
        out.push_str(&text[last_end..]);

        (out, count)
    }
}
