use once_cell::sync::Lazy;
use regex::Regex;

use crate::detector::{Category, DetectorMeta, Phase};
use crate::regex_detector::{Match, RegexDetector, Replacement};

static PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z]{1,2}\d{6,9}\b").expect("valid regex"));
static CONTEXT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)passport").expect("valid regex"));

fn build(m: &Match<'_>) -> Replacement {
    let token = m.codec.hmac_short(m.whole, 12);
    Replacement::simple(format!("[PASSPORT-{token}]"))
}

/// Alphanumeric IDs of this shape are common (order numbers, SKUs), so
/// this detector only fires when the word "passport" appears somewhere
/// else in the scanned text.
#[must_use]
pub fn detector() -> RegexDetector {
    RegexDetector::new(
        DetectorMeta {
            id: "passport",
            display_name: "Passport number",
            category: Category::Pii,
            priority: 30,
            phases: &[Phase::PreCall],
            default_enabled: true,
        },
        PATTERN.clone(),
        Box::new(build),
    )
    .with_context(CONTEXT.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::Detector;
    use crate::reverse_map::ReverseMap;
    use relay_crypto::{Key, TokenCodec};

    #[test]
    fn requires_context_keyword() {
        let d = detector();
        let codec = TokenCodec::new(Key::from_bytes([9u8; 32]));
        let map = ReverseMap::new();
        let (out, n) = d.execute("order number AB1234567", &codec, &map);
        assert_eq!(n, 0);
        assert_eq!(out, "order number AB1234567");
    }

    #[test]
    fn fires_with_context_keyword() {
        let d = detector();
        let codec = TokenCodec::new(Key::from_bytes([9u8; 32]));
        let map = ReverseMap::new();
        let (out, n) = d.execute("my passport number is AB1234567", &codec, &map);
        assert_eq!(n, 1);
        assert!(out.contains("[PASSPORT-"));
    }
}
