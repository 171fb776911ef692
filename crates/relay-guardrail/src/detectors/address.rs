use once_cell::sync::Lazy;
use regex::Regex;

use crate::detector::{Category, DetectorMeta, Phase};
use crate::regex_detector::{Match, RegexDetector, Replacement};

static PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b\d{1,5}\s+[A-Za-z0-9.'\s]{2,40}\b(?:street|st|avenue|ave|boulevard|blvd|road|rd|lane|ln|drive|dr|court|ct|place|pl|way|terrace|circle|cir)\b\.?",
    )
    .expect("valid regex")
});

fn build(m: &Match<'_>) -> Replacement {
    let token = m.codec.hmac_short(m.whole, 12);
    Replacement::simple(format!("[ADDRESS-{token}]"))
}

#[must_use]
pub fn detector() -> RegexDetector {
    RegexDetector::new(
        DetectorMeta {
            id: "address",
            display_name: "Street address",
            category: Category::Pii,
            priority: 35,
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
    fn replaces_street_address() {
        let d = detector();
        let codec = TokenCodec::new(Key::from_bytes([11u8; 32]));
        let map = ReverseMap::new();
        let (out, n) = d.execute("ship to 1600 Pennsylvania Avenue", &codec, &map);
        assert_eq!(n, 1);
        assert!(out.contains("[ADDRESS-"));
    }
}
