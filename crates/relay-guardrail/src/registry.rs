use std::collections::HashMap;

use crate::detector::{Category, Detector, Phase};
use crate::detectors::{
    address, api_key, aws_key, credit_card, email, iban, ip, jwt, name, passport, password, phone,
    private_key, ssn, url_cred,
};

/// Per-detector and per-category overrides layered on top of each
/// detector's own default. A detector-id override always wins; absent
/// that, a category override; absent that, the detector's declared
/// default.
#[derive(Debug, Clone, Default)]
pub struct GuardrailConfig {
    pub detector_overrides: HashMap<String, bool>,
    pub category_overrides: HashMap<Category, bool>,
}

impl GuardrailConfig {
    fn is_enabled(&self, id: &str, category: Category, default_enabled: bool) -> bool {
        if let Some(&enabled) = self.detector_overrides.get(id) {
            return enabled;
        }
        if let Some(&enabled) = self.category_overrides.get(&category) {
            return enabled;
        }
        default_enabled
    }
}

/// Priority-ordered collection of every known detector. Built once at
/// boot; `active_for` filters it per-request against the current config
/// without mutating the registry itself.
pub struct DetectorRegistry {
    detectors: Vec<Box<dyn Detector>>,
}

impl DetectorRegistry {
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut detectors: Vec<Box<dyn Detector>> = vec![
            Box::new(private_key::detector()),
            Box::new(aws_key::detector()),
            Box::new(api_key::ApiKeyDetector::new()),
            Box::new(password::PasswordDetector::new()),
            Box::new(email::detector()),
            Box::new(ssn::detector()),
            Box::new(credit_card::detector()),
            Box::new(iban::detector()),
            Box::new(jwt::detector()),
            Box::new(url_cred::detector()),
            Box::new(phone::detector()),
            Box::new(passport::detector()),
            Box::new(address::detector()),
            Box::new(ip::detector_v4()),
            Box::new(ip::detector_v6()),
            Box::new(name::NameDetector::new()),
        ];
        detectors.sort_by_key(|d| d.meta().priority);
        Self { detectors }
    }

    /// Detectors eligible for `phase` under `config`, already in priority
    /// order.
    pub fn active_for(&self, phase: Phase, config: &GuardrailConfig) -> impl Iterator<Item = &dyn Detector> {
        self.detectors.iter().filter_map(move |d| {
            let meta = d.meta();
            let enabled = config.is_enabled(meta.id, meta.category, meta.default_enabled);
            (enabled && d.should_run(phase)).then_some(d.as_ref())
        })
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_detector_excluded_by_default() {
        let registry = DetectorRegistry::with_defaults();
        let config = GuardrailConfig::default();
        let ids: Vec<&str> = registry.active_for(Phase::PreCall, &config).map(|d| d.meta().id).collect();
        assert!(!ids.contains(&"name"));
        assert!(ids.contains(&"email"));
    }

    #[test]
    fn detector_override_wins_over_default() {
        let registry = DetectorRegistry::with_defaults();
        let mut config = GuardrailConfig::default();
        config.detector_overrides.insert("email".to_owned(), false);
        let ids: Vec<&str> = registry.active_for(Phase::PreCall, &config).map(|d| d.meta().id).collect();
        assert!(!ids.contains(&"email"));
    }

    #[test]
    fn category_override_enables_name_detector() {
        let registry = DetectorRegistry::with_defaults();
        let mut config = GuardrailConfig::default();
        config.category_overrides.insert(Category::Pii, true);
        let ids: Vec<&str> = registry.active_for(Phase::PreCall, &config).map(|d| d.meta().id).collect();
        assert!(ids.contains(&"name"));
    }

    #[test]
    fn priority_order_is_ascending() {
        let registry = DetectorRegistry::with_defaults();
        let config = GuardrailConfig::default();
        let priorities: Vec<i32> = registry.active_for(Phase::PreCall, &config).map(|d| d.meta().priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort_unstable();
        assert_eq!(priorities, sorted);
    }
}
