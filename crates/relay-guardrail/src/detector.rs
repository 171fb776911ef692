use relay_crypto::TokenCodec;
use serde::{Deserialize, Serialize};

use crate::reverse_map::ReverseMap;

/// Broad grouping used for per-category allow-list configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Pii,
    Credentials,
    Network,
    Financial,
}

/// When in the pipeline a detector is eligible to run. The engine only
/// ever runs `PreCall` today (anonymisation happens before the request is
/// forwarded); `PostCall` is reserved for response-side scanning a future
/// detector might need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    PreCall,
    PostCall,
}

/// Static metadata every detector declares, independent of its matching
/// strategy.
#[derive(Debug, Clone)]
pub struct DetectorMeta {
    pub id: &'static str,
    pub display_name: &'static str,
    pub category: Category,
    /// Lower runs first.
    pub priority: i32,
    pub phases: &'static [Phase],
    /// Whether this detector is active absent any configuration override.
    pub default_enabled: bool,
}

/// A single named detector in the guardrail registry.
///
/// Implementations compose freely: regex-backed detectors share one
/// generic executor ([`crate::regex_detector::RegexDetector`]); detectors
/// whose logic can't be expressed as a regex implement this trait
/// directly ("composite" detectors in the spec's vocabulary).
pub trait Detector: Send + Sync {
    fn meta(&self) -> &DetectorMeta;

    /// Whether this detector should run over `text` in the given phase.
    /// The default only checks the phase is declared; composite
    /// detectors that need a cheap pre-filter (e.g. "contains an `=`")
    /// can override this to skip expensive work.
    fn should_run(&self, phase: Phase) -> bool {
        self.meta().phases.contains(&phase)
    }

    /// Scan `text`, replace every match, and record replacement->original
    /// pairs in `reverse_map`. Returns the (possibly unchanged) text and
    /// the number of replacements made.
    ///
    /// `codec` supplies deterministic, reversible tokens for categories
    /// whose replacement format embeds an encrypted token rather than an
    /// opaque HMAC suffix.
    fn execute(&self, text: &str, codec: &TokenCodec, reverse_map: &ReverseMap) -> (String, usize);
}
