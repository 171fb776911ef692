use once_cell::sync::Lazy;
use regex::Regex;

use crate::detector::{Category, DetectorMeta, Phase};
use crate::regex_detector::{Match, RegexDetector, Replacement};

static PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z]{2}\d{2}[ ]?(?:[A-Z0-9]{4}[ ]?){2,7}[A-Z0-9]{1,4}\b").expect("valid regex"));

fn build(m: &Match<'_>) -> Replacement {
    let compact: String = m.whole.chars().filter(|c| !c.is_whitespace()).collect();
    let token = m.codec.hmac_short(&compact, 12);
    Replacement::simple(format!("[IBAN-{token}]"))
}

#[must_use]
pub fn detector() -> RegexDetector {
    RegexDetector::new(
        DetectorMeta {
            id: "iban",
            display_name: "IBAN",
            category: Category::Financial,
            priority: 16,
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
    fn replaces_iban() {
        let d = detector();
        let codec = TokenCodec::new(Key::from_bytes([8u8; 32]));
        let map = ReverseMap::new();
        let (out, n) = d.execute("iban DE89 3704 0044 0532 0130 00", &codec, &map);
        assert_eq!(n, 1);
        assert!(out.contains("[IBAN-"));
    }
}
