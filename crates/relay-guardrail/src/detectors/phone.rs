use once_cell::sync::Lazy;
use regex::Regex;

use crate::detector::{Category, DetectorMeta, Phase};
use crate::regex_detector::{Match, RegexDetector, Replacement};

static PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+?1[-.\s]?)?\(?\b(\d{3})\)?[-.\s](\d{3})[-.\s](\d{4})\b").expect("valid regex")
});

/// `AAA-XXX-LLLL-<token>`: the real area code is carried over (useful for
/// locale-aware downstream behaviour), the exchange and line digits are
/// masked, and an 8-char HMAC token makes the whole replacement reversible
/// and stable across occurrences of the same number.
fn build(m: &Match<'_>) -> Replacement {
    let area = &m.captures[1];
    let token = m.codec.hmac_short(m.whole, 8);
    let replacement = format!("{area}-XXX-LLLL-{token}");

    let bare_prefix = format!("{area}-XXX-LLLL");
    Replacement {
        text: replacement,
        extra_reverse_entries: vec![(bare_prefix, m.whole.to_owned())],
    }
}

#[must_use]
pub fn detector() -> RegexDetector {
    RegexDetector::new(
        DetectorMeta {
            id: "phone",
            display_name: "Phone number",
            category: Category::Pii,
            priority: 20,
            phases: &[Phase::PreCall],
            default_enabled: true,
        },
        PATTERN.clone(),
        Box::new(build),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::Detector;
    use crate::reverse_map::ReverseMap;
    use relay_crypto::{Key, TokenCodec};

    #[test]
    fn replaces_us_phone_preserving_area_code() {
        let d = detector();
        let codec = TokenCodec::new(Key::from_bytes([4u8; 32]));
        let map = ReverseMap::new();
        let (out, n) = d.execute("call 415-555-1234 now", &codec, &map);
        assert_eq!(n, 1);
        assert!(out.starts_with("call 415-XXX-LLLL-"));
    }
}
