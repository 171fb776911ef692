use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::detector::{Category, DetectorMeta, Phase};
use crate::regex_detector::{Match, RegexDetector, Replacement};

static PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{3})-(\d{2})-(\d{4})\b").expect("valid regex"));

/// Rejects the ranges the SSA never issues: area 000/666/9xx, group 00,
/// serial 0000.
fn is_plausible(caps: &Captures<'_>) -> bool {
    let area: u32 = caps[1].parse().unwrap_or(0);
    let group: u32 = caps[2].parse().unwrap_or(0);
    let serial: u32 = caps[3].parse().unwrap_or(0);

    if area == 0 || area == 666 || area >= 900 {
        return false;
    }
    if group == 0 {
        return false;
    }
    if serial == 0 {
        return false;
    }
    true
}

fn build(m: &Match<'_>) -> Replacement {
    let token = m.codec.hmac_short(m.whole, 12);
    Replacement::simple(format!("[SSN-{token}]"))
}

#[must_use]
pub fn detector() -> RegexDetector {
    RegexDetector::new(
        DetectorMeta {
            id: "ssn",
            display_name: "US Social Security Number",
            category: Category::Pii,
            priority: 15,
            phases: &[Phase::PreCall],
            default_enabled: true,
        },
        PATTERN.clone(),
        Box::new(build),
    )
    .with_validator(Box::new(is_plausible))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::Detector;
    use crate::reverse_map::ReverseMap;
    use relay_crypto::{Key, TokenCodec};

    #[test]
    fn replaces_plausible_ssn() {
        let d = detector();
        let codec = TokenCodec::new(Key::from_bytes([5u8; 32]));
        let map = ReverseMap::new();
        let (out, n) = d.execute("ssn is 123-45-6789", &codec, &map);
        assert_eq!(n, 1);
        assert!(out.contains("[SSN-"));
    }

    #[test]
    fn rejects_invalid_area() {
        let d = detector();
        let codec = TokenCodec::new(Key::from_bytes([5u8; 32]));
        let map = ReverseMap::new();
        let (out, n) = d.execute("ssn is 666-45-6789", &codec, &map);
        assert_eq!(n, 0);
        assert_eq!(out, "ssn is 666-45-6789");
    }

    #[test]
    fn rejects_zero_group_or_serial() {
        let d = detector();
        let codec = TokenCodec::new(Key::from_bytes([5u8; 32]));
        let map = ReverseMap::new();
        let (_, n1) = d.execute("123-00-6789", &codec, &map);
        let (_, n2) = d.execute("123-45-0000", &codec, &map);
        assert_eq!(n1, 0);
        assert_eq!(n2, 0);
    }
}
