use regex::{Captures, Regex};
use relay_crypto::TokenCodec;

use crate::detector::{Detector, DetectorMeta};
use crate::reverse_map::ReverseMap;

/// Everything a regex match's generator needs to build a replacement.
pub struct Match<'a> {
    pub whole: &'a str,
    pub captures: &'a Captures<'a>,
    pub codec: &'a TokenCodec,
}

/// The result of generating a replacement for one match: the text that
/// goes in-place, plus any additional `(replacement, original)` pairs the
/// pipeline should register so a downstream model extracting a sub-value
/// verbatim (e.g. the bare IP inside an `[IP-...]` token) can still be
/// reversed.
pub struct Replacement {
    pub text: String,
    pub extra_reverse_entries: Vec<(String, String)>,
}

impl Replacement {
    #[must_use]
    pub fn simple(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            extra_reverse_entries: Vec::new(),
        }
    }
}

type Generator = dyn Fn(&Match<'_>) -> Replacement + Send + Sync;
type Validator = dyn Fn(&Captures<'_>) -> bool + Send + Sync;

/// A detector whose matching logic is a single compiled regex, optionally
/// gated by a context regex that must match elsewhere in the surrounding
/// text, and an optional validator run against the match itself (e.g. the
/// SSN area/group/serial check).
pub struct RegexDetector {
    meta: DetectorMeta,
    pattern: Regex,
    context_pattern: Option<Regex>,
    validator: Option<Box<Validator>>,
    generate: Box<Generator>,
}

impl RegexDetector {
    #[must_use]
    pub fn new(meta: DetectorMeta, pattern: Regex, generate: Box<Generator>) -> Self {
        Self {
            meta,
            pattern,
            context_pattern: None,
            validator: None,
            generate,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context_pattern: Regex) -> Self {
        self.context_pattern = Some(context_pattern);
        self
    }

    #[must_use]
    pub fn with_validator(mut self, validator: Box<Validator>) -> Self {
        self.validator = Some(validator);
        self
    }
}

impl Detector for RegexDetector {
    fn meta(&self) -> &DetectorMeta {
        &self.meta
    }

    fn execute(&self, text: &str, codec: &TokenCodec, reverse_map: &ReverseMap) -> (String, usize) {
        if let Some(ctx) = &self.context_pattern
            && !ctx.is_match(text)
        {
            return (text.to_owned(), 0);
        }

        let mut count = 0usize;
        let mut last_end = 0usize;
        let mut out = String::with_capacity(text.len());

        for caps in self.pattern.captures_iter(text) {
            let m = caps.get(0).expect("capture group 0 always present");
            if let Some(validator) = &self.validator
                && !validator(&caps)
            {
                continue;
            }

            out.push_str(&text[last_end..m.start()]);

            let match_ctx = Match {
                whole: m.as_str(),
                captures: &caps,
                codec,
            };
            let replacement = (self.generate)(&match_ctx);

            reverse_map.insert(replacement.text.clone(), m.as_str().to_owned());
            for (rep, orig) in replacement.extra_reverse_entries {
                reverse_map.insert(rep, orig);
            }

            out.push_str(&replacement.text);
            last_end = m.end();
            count += 1;
        }
        out.push_str(&text[last_end..]);

        (out, count)
    }
}
