use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::detector::{Category, DetectorMeta, Phase};
use crate::regex_detector::{Match, RegexDetector, Replacement};

/// Loosely matches digit groups separated by spaces/dashes; the validator
/// narrows this down to plausible card lengths and prefixes, since the
/// grouping conventions differ by network (4-4-4-4 for Visa/MC/Discover,
/// 4-6-5 for Amex).
static PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d(?:[ -]?\d){12,18}\b").expect("valid regex"));

fn digits_of(text: &str) -> String {
    text.chars().filter(char::is_ascii_digit).collect()
}

fn card_type(digits: &str) -> Option<&'static str> {
    let len = digits.len();
    if digits.starts_with('4') && matches!(len, 13 | 16 | 19) {
        return Some("VISA");
    }
    if (digits.starts_with("34") || digits.starts_with("37")) && len == 15 {
        return Some("AMEX");
    }
    if digits.starts_with("6011") && len == 16 {
        return Some("DISCOVER");
    }
    if len == 16 {
        let prefix: u32 = digits[..2].parse().unwrap_or(0);
        if (51..=55).contains(&prefix) {
            return Some("MC");
        }
    }
    None
}

fn is_card(caps: &Captures<'_>) -> bool {
    card_type(&digits_of(&caps[0])).is_some()
}

fn build(m: &Match<'_>) -> Replacement {
    let digits = digits_of(m.whole);
    let kind = card_type(&digits).unwrap_or("CARD");
    let token = m.codec.hmac_short(&digits, 12);
    Replacement::simple(format!("[{kind}-{token}]"))
}

#[must_use]
pub fn detector() -> RegexDetector {
    RegexDetector::new(
        DetectorMeta {
            id: "credit-card",
            display_name: "Credit card number",
            category: Category::Financial,
            priority: 15,
            phases: &[Phase::PreCall],
            default_enabled: true,
        },
        PATTERN.clone(),
        Box::new(build),
    )
    .with_validator(Box::new(is_card))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::Detector;
    use crate::reverse_map::ReverseMap;
    use relay_crypto::{Key, TokenCodec};

    #[test]
    fn tags_visa() {
        let d = detector();
        let codec = TokenCodec::new(Key::from_bytes([6u8; 32]));
        let map = ReverseMap::new();
        let (out, n) = d.execute("card 4111 1111 1111 1111", &codec, &map);
        assert_eq!(n, 1);
        assert!(out.contains("[VISA-"));
    }

    #[test]
    fn tags_amex() {
        let d = detector();
        let codec = TokenCodec::new(Key::from_bytes([6u8; 32]));
        let map = ReverseMap::new();
        let (out, n) = d.execute("card 3782 822463 10005", &codec, &map);
        assert_eq!(n, 1);
        assert!(out.contains("[AMEX-"));
    }
}
