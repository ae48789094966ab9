//! Ordered, case-insensitive header storage.
//!
//! [`HeaderStore`] keeps headers in insertion order while treating names
//! case-insensitively: `set` replaces an existing entry in place (keeping
//! its position), lookups ignore case, and equality is multiset equality
//! after lowercasing names.

use std::collections::HashMap;

/// Ordered multimap of header name to value with case-insensitive
/// uniqueness on the name.
#[derive(Debug, Clone, Default)]
pub struct HeaderStore {
    entries: Vec<(String, String)>,
}

impl HeaderStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The default headers every client starts with: `Accept-Encoding`,
    /// `Accept-Language`, and a `User-Agent` derived from the crate
    /// identifiers.
    pub fn with_defaults() -> Self {
        let mut store = Self::new();
        // The pipeline does not decode content encodings, so only
        // identity may be advertised.
        store.set("Accept-Encoding", "identity");
        store.set("Accept-Language", "en");
        store.set(
            "User-Agent",
            concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")),
        );
        store
    }

    /// Set a header. Replaces an existing same-name entry in place,
    /// keeping its position; otherwise appends.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(idx) => self.entries[idx] = (name, value),
            None => self.entries.push((name, value)),
        }
    }

    /// Remove a header by name. Returns the removed value, if any.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let idx = self.position(name)?;
        Some(self.entries.remove(idx).1)
    }

    /// Look up a header value by name, case-insensitively.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.position(name).map(|idx| self.entries[idx].1.as_str())
    }

    /// Whether a header with this name is present.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Merge another store into this one. Entries from `other` win on
    /// name collisions.
    pub fn merge(&mut self, other: &HeaderStore) {
        for (name, value) in &other.entries {
            self.set(name.clone(), value.clone());
        }
    }

    /// Collapse to a plain dictionary, last entry winning per name.
    /// Iteration order of the result is unspecified.
    pub fn as_map(&self) -> HashMap<String, String> {
        self.entries
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }
}

impl PartialEq for HeaderStore {
    /// Multiset equality after lowercasing names; order is ignored.
    fn eq(&self, other: &Self) -> bool {
        if self.entries.len() != other.entries.len() {
            return false;
        }
        let normalize = |store: &HeaderStore| {
            let mut pairs: Vec<(String, String)> = store
                .entries
                .iter()
                .map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
                .collect();
            pairs.sort();
            pairs
        };
        normalize(self) == normalize(other)
    }
}

impl Eq for HeaderStore {}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for HeaderStore {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        let mut store = HeaderStore::new();
        for (name, value) in iter {
            store.set(name, value);
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces_case_insensitively_in_place() {
        let mut store = HeaderStore::new();
        store.set("Content-Type", "text/plain");
        store.set("X-Other", "1");
        store.set("content-type", "application/json");

        assert_eq!(store.len(), 2);
        assert_eq!(store.value("CONTENT-TYPE"), Some("application/json"));
        // Replacement keeps the original position.
        let first = store.iter().next().unwrap();
        assert_eq!(first.1, "application/json");
    }

    #[test]
    fn test_remove_and_contains() {
        let mut store = HeaderStore::new();
        store.set("Authorization", "Bearer t");
        assert!(store.contains("authorization"));
        assert_eq!(store.remove("AUTHORIZATION"), Some("Bearer t".into()));
        assert!(!store.contains("authorization"));
        assert_eq!(store.remove("authorization"), None);
    }

    #[test]
    fn test_merge_other_wins() {
        let mut base = HeaderStore::new();
        base.set("Accept", "text/html");
        base.set("X-Keep", "yes");

        let mut other = HeaderStore::new();
        other.set("accept", "application/json");
        other.set("X-New", "1");

        base.merge(&other);
        assert_eq!(base.value("Accept"), Some("application/json"));
        assert_eq!(base.value("X-Keep"), Some("yes"));
        assert_eq!(base.value("X-New"), Some("1"));
        assert_eq!(base.len(), 3);
    }

    #[test]
    fn test_multiset_equality_ignores_case_and_order() {
        let a: HeaderStore = [("Accept", "1"), ("X-B", "2")].into_iter().collect();
        let b: HeaderStore = [("x-b", "2"), ("ACCEPT", "1")].into_iter().collect();
        assert_eq!(a, b);

        let c: HeaderStore = [("accept", "other"), ("x-b", "2")].into_iter().collect();
        assert_ne!(a, c);
    }

    #[test]
    fn test_as_map_last_wins() {
        let mut store = HeaderStore::new();
        store.set("A", "1");
        store.set("B", "2");
        let map = store.as_map();
        assert_eq!(map.get("A").map(String::as_str), Some("1"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_defaults_present() {
        let store = HeaderStore::with_defaults();
        // Only identity until the pipeline learns to decode encodings.
        assert_eq!(store.value("accept-encoding"), Some("identity"));
        assert!(store.contains("accept-language"));
        assert!(store.value("user-agent").unwrap().starts_with("wireline/"));
    }
}
