use once_cell::sync::Lazy;
use regex::Regex;

use crate::detector::{Category, DetectorMeta, Phase};
use crate::regex_detector::{Match, RegexDetector, Replacement};

static PATTERN_V4: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:(?:25[0-5]|2[0-4]\d|1?\d?\d)\.){3}(?:25[0-5]|2[0-4]\d|1?\d?\d)\b").expect("valid regex"));

static PATTERN_V6: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:[A-Fa-f0-9]{1,4}:){2,7}[A-Fa-f0-9]{1,4}\b").expect("valid regex")
});

/// Derives a quad that looks like an IP but is synthesised from the HMAC
/// digest, never a real address, so the replacement cannot leak network
/// topology even in aggregate.
fn fake_quad(digest: &str) -> String {
    let bytes = hex::decode(&digest[..8]).unwrap_or_default();
    if bytes.len() == 4 {
        format!("{}.{}.{}.{}", bytes[0], bytes[1], bytes[2], bytes[3])
    } else {
        "10.0.0.1".to_owned()
    }
}

fn build_v4(m: &Match<'_>) -> Replacement {
    let digest = m.codec.hmac_short(m.whole, 8);
    let quad = fake_quad(&digest);
    let token = m.codec.hmac_short(m.whole, 6);
    let text = format!("[IP-{quad}-{token}]");
    Replacement {
        extra_reverse_entries: vec![(quad, m.whole.to_owned())],
        text,
    }
}

fn build_v6(m: &Match<'_>) -> Replacement {
    let token = m.codec.hmac_short(m.whole, 12);
    Replacement::simple(format!("[IPV6-{token}]"))
}

#[must_use]
pub fn detector_v4() -> RegexDetector {
    RegexDetector::new(
        DetectorMeta {
            id: "ipv4",
            display_name: "IPv4 address",
            category: Category::Network,
            priority: 40,
            phases: &[Phase::PreCall],
            default_enabled: true,
        },
        PATTERN_V4.clone(),
        Box::new(build_v4),
    )
}

#[must_use]
pub fn detector_v6() -> RegexDetector {
    RegexDetector::new(
        DetectorMeta {
            id: "ipv6",
            display_name: "IPv6 address",
            category: Category::Network,
            priority: 41,
            phases: &[Phase::PreCall],
            default_enabled: true,
        },
        PATTERN_V6.clone(),
        Box::new(build_v6),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::Detector;
    use crate::reverse_map::ReverseMap;
    use relay_crypto::{Key, TokenCodec};

    #[test]
    fn v4_never_emits_real_looking_original_quad_verbatim() {
        let d = detector_v4();
        let codec = TokenCodec::new(Key::from_bytes([10u8; 32]));
        let map = ReverseMap::new();
        let (out, n) = d.execute("server at 192.168.1.42 is down", &codec, &map);
        assert_eq!(n, 1);
        assert!(!out.contains("192.168.1.42"));
        assert!(out.contains("[IP-"));
    }

    #[test]
    fn v6_replaces() {
        let d = detector_v6();
        let codec = TokenCodec::new(Key::from_bytes([10u8; 32]));
        let map = ReverseMap::new();
        let (out, n) = d.execute("host 2001:0db8:85a3:0000:0000:8a2e:0370:7334", &codec, &map);
        assert_eq!(n, 1);
        assert!(out.contains("[IPV6-"));
    }
}
