use std::collections::HashMap;

/// Shannon entropy in bits per character.
#[must_use]
pub fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }
    let mut counts: HashMap<char, u32> = HashMap::new();
    for c in s.chars() {
        *counts.entry(c).or_insert(0) += 1;
    }
    let len = s.chars().count() as f64;
    counts
        .values()
        .map(|&count| {
            let p = f64::from(count) / len;
            -p * p.log2()
        })
        .sum()
}

/// Number of distinct character classes present: lowercase, uppercase,
/// digit, other.
#[must_use]
pub fn char_class_count(s: &str) -> u32 {
    let mut lower = false;
    let mut upper = false;
    let mut digit = false;
    let mut other = false;
    for c in s.chars() {
        if c.is_ascii_lowercase() {
            lower = true;
        } else if c.is_ascii_uppercase() {
            upper = true;
        } else if c.is_ascii_digit() {
            digit = true;
        } else {
            other = true;
        }
    }
    u32::from(lower) + u32::from(upper) + u32::from(digit) + u32::from(other)
}

#[must_use]
pub fn looks_like_hex(s: &str) -> bool {
    s.len() >= 32 && s.chars().all(|c| c.is_ascii_hexdigit())
}

#[must_use]
pub fn looks_like_base64(s: &str) -> bool {
    s.len() >= 20
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=')
}

/// Whether a standalone token is plausibly a secret, per the thresholds
/// the entropy fallback uses across api-key and password scanning:
/// entropy >= 4.0 with >= 3 char classes, or >= 3.5 with >= 16 chars, or
/// >= 3.0 with >= 32 chars, or a long hex string, or base64-looking with
/// entropy >= 3.5.
#[must_use]
pub fn looks_like_secret(token: &str) -> bool {
    let entropy = shannon_entropy(token);
    let classes = char_class_count(token);
    let len = token.len();

    (entropy >= 4.0 && classes >= 3)
        || (entropy >= 3.5 && len >= 16)
        || (entropy >= 3.0 && len >= 32)
        || looks_like_hex(token)
        || (looks_like_base64(token) && entropy >= 3.5)
}

/// Identifiers like `my-config-value` or `feature-flag-name` read as high
/// entropy under a naive scan; reject anything that is purely lowercase
/// words joined by hyphens.
#[must_use]
pub fn is_kebab_case_identifier(token: &str) -> bool {
    !token.is_empty()
        && token.contains('-')
        && token
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_string_has_zero_entropy() {
        assert_eq!(shannon_entropy("aaaa"), 0.0);
    }

    #[test]
    fn mixed_string_has_positive_entropy() {
        assert!(shannon_entropy("aB3!xQ9z") > 2.0);
    }

    #[test]
    fn kebab_case_identifier_detected() {
        assert!(is_kebab_case_identifier("my-feature-flag"));
        assert!(!is_kebab_case_identifier("MyFeatureFlag"));
    }

    #[test]
    fn high_entropy_token_flagged_as_secret() {
        assert!(looks_like_secret("Xk9#mQ2pL8vR4zN7wS1t"));
    }

    #[test]
    fn low_entropy_word_not_flagged() {
        assert!(!looks_like_secret("hello-world-identifier"));
    }
}
