use once_cell::sync::Lazy;
use regex::Regex;

use crate::detector::{Category, DetectorMeta, Phase};
use crate::regex_detector::{Match, RegexDetector, Replacement};

static PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("valid regex")
});

const FIRST_NAMES: &[&str] = &[
    "alex", "jordan", "taylor", "morgan", "casey", "riley", "jamie", "drew", "sam", "avery",
    "quinn", "rowan", "blake", "harper", "reese",
];
const LAST_NAMES: &[&str] = &[
    "smith", "johnson", "brown", "garcia", "miller", "davis", "rodriguez", "martinez", "clark",
    "lewis", "walker", "young", "king", "wright", "hill",
];

/// `firstname.lastnameNN@anon.com`, deterministic from an HMAC over the
/// original address so the same email always maps to the same alias.
fn build(m: &Match<'_>) -> Replacement {
    let digest = m.codec.hmac_short(m.whole, 8);
    let idx = u32::from_str_radix(&digest[..4], 16).unwrap_or(0) as usize;
    let first = FIRST_NAMES[idx % FIRST_NAMES.len()];
    let last = LAST_NAMES[(idx / FIRST_NAMES.len()) % LAST_NAMES.len()];
    let suffix = u32::from_str_radix(&digest[4..8], 16).unwrap_or(0) % 100;
    Replacement::simple(format!("{first}.{last}{suffix:02}@anon.com"))
}

#[must_use]
pub fn detector() -> RegexDetector {
    RegexDetector::new(
        DetectorMeta {
            id: "email",
            display_name: "Email address",
            category: Category::Pii,
            priority: 10,
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
    fn replaces_email_deterministically() {
        let d = detector();
        let codec = TokenCodec::new(Key::from_bytes([3u8; 32]));
        let map = ReverseMap::new();
        let (out1, n1) = d.execute("reach alice@example.com for help", &codec, &map);
        let (out2, n2) = d.execute("reach alice@example.com for help", &codec, &map);
        assert_eq!(n1, 1);
        assert_eq!(n2, 1);
        assert_eq!(out1, out2);
        assert!(out1.contains("@anon.com"));
        assert!(!out1.contains("alice@example.com"));
    }
}
