//! Local copy of the served configuration.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigState {
    pub snapshot_id: Option<u64>,
    pub version_number: Option<u64>,
    pub values: BTreeMap<String, String>,
}

/// Whole-scope replacement store shared between the session task and readers.
#[derive(Debug, Clone, Default)]
pub struct LocalConfigStore {
    inner: Arc<RwLock<ConfigState>>,
}

impl LocalConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a previously saved state, e.g. the on-disk cache.
    pub fn with_state(state: ConfigState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    /// Apply a pushed update. An update older than the held version is
    /// dropped and `false` is returned.
    pub fn replace(&self, next: ConfigState) -> bool {
        let mut state = self.inner.write();
        if let (Some(held), Some(incoming)) = (state.version_number, next.version_number) {
            if incoming < held {
                tracing::debug!(held, incoming, "Ignoring stale configuration");
                return false;
            }
        }
        *state = next;
        true
    }

    /// Adopt what the server currently serves, whatever its version.
    ///
    /// Used for pulls: after a server restore the served version may be lower
    /// than the held one and must still win. Returns whether anything changed.
    pub fn force_replace(&self, next: ConfigState) -> bool {
        let mut state = self.inner.write();
        if *state == next {
            return false;
        }
        if let (Some(held), Some(incoming)) = (state.version_number, next.version_number) {
            if incoming < held {
                tracing::info!(held, incoming, "Server serves an older version, adopting it");
            }
        }
        *state = next;
        true
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.read().values.get(key).cloned()
    }

    /// The held value, or `default` when the key is absent (including before
    /// anything was loaded).
    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    pub fn snapshot(&self) -> ConfigState {
        self.inner.read().clone()
    }

    pub fn version(&self) -> Option<u64> {
        self.inner.read().version_number
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(version: Option<u64>, pairs: &[(&str, &str)]) -> ConfigState {
        ConfigState {
            snapshot_id: version,
            version_number: version,
            values: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    #[test]
    fn replace_drops_removed_keys() {
        let store = LocalConfigStore::new();
        assert!(store.replace(state(Some(1), &[("a", "1"), ("b", "2")])));
        assert!(store.replace(state(Some(2), &[("a", "3")])));
        assert_eq!(store.get("a").as_deref(), Some("3"));
        assert_eq!(store.get("b"), None);
    }

    #[test]
    fn stale_pushes_are_ignored() {
        let store = LocalConfigStore::new();
        store.replace(state(Some(5), &[("a", "new")]));
        assert!(!store.replace(state(Some(4), &[("a", "old")])));
        assert_eq!(store.get("a").as_deref(), Some("new"));
        assert_eq!(store.version(), Some(5));
    }

    #[test]
    fn pulled_state_wins_even_when_older() {
        let store = LocalConfigStore::new();
        store.replace(state(Some(3), &[("timeout", "90")]));

        assert!(store.force_replace(state(Some(2), &[("timeout", "45")])));
        assert_eq!(store.get("timeout").as_deref(), Some("45"));
        assert_eq!(store.version(), Some(2));

        assert!(!store.force_replace(state(Some(2), &[("timeout", "45")])));
    }

    #[test]
    fn defaults_cover_missing_keys() {
        let store = LocalConfigStore::new();
        assert!(store.is_empty());
        assert_eq!(store.get_or("timeout", "30"), "30");

        store.replace(state(Some(1), &[("timeout", "45")]));
        assert_eq!(store.get_or("timeout", "30"), "45");
    }
}
