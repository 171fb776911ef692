use dashmap::DashMap;

/// In-memory replacement -> original index, populated during anonymisation
/// and consulted during deanonymisation.
///
/// Process-lifetime, read-mostly, concurrent readers and writers, entries
/// never expire by default and are deduplicated by replacement (inserting
/// the same replacement string twice is a no-op on the second insert, so
/// the earliest mapping wins -- this matters when two distinct originals
/// would otherwise collide on a replacement, which determinism makes rare
/// but not impossible across domains).
#[derive(Default)]
pub struct ReverseMap {
    inner: DashMap<String, String>,
}

impl ReverseMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, replacement: impl Into<String>, original: impl Into<String>) {
        self.inner.entry(replacement.into()).or_insert_with(|| original.into());
    }

    #[must_use]
    pub fn get(&self, replacement: &str) -> Option<String> {
        self.inner.get(replacement).map(|v| v.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterate over `(replacement, original)` pairs for whole-word
    /// scanning during deanonymisation (used for fake names and other
    /// free-form replacements that don't match a fixed bracket grammar).
    pub fn iter(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.inner.iter().map(|e| (e.key().clone(), e.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_dedup_by_replacement() {
        let map = ReverseMap::new();
        map.insert("[EMAIL-abc123456789]", "first@example.com");
        map.insert("[EMAIL-abc123456789]", "second@example.com");
        assert_eq!(map.get("[EMAIL-abc123456789]").unwrap(), "first@example.com");
    }

    #[test]
    fn missing_key_returns_none() {
        let map = ReverseMap::new();
        assert!(map.get("nope").is_none());
    }
}
