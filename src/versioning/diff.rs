//! Structural diff between two key→value maps.
//!
//! Shared by version and snapshot comparison. Swapping the inputs swaps
//! `added` and `removed` and flips every `changed` entry.

use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueChange<V> {
    pub from: V,
    pub to: V,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigDiff<V> {
    /// Keys only present on the right-hand side.
    pub added: BTreeMap<String, V>,
    /// Keys only present on the left-hand side.
    pub removed: BTreeMap<String, V>,
    /// Keys present on both sides with different values.
    pub changed: BTreeMap<String, ValueChange<V>>,
}

impl<V> ConfigDiff<V> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Compute the diff that turns `left` into `right`.
pub fn diff_maps<V: Clone + PartialEq>(left: &BTreeMap<String, V>, right: &BTreeMap<String, V>) -> ConfigDiff<V> {
    let mut diff = ConfigDiff {
        added: BTreeMap::new(),
        removed: BTreeMap::new(),
        changed: BTreeMap::new(),
    };

    for (key, left_value) in left {
        match right.get(key) {
            None => {
                diff.removed.insert(key.clone(), left_value.clone());
            }
            Some(right_value) if right_value != left_value => {
                diff.changed.insert(
                    key.clone(),
                    ValueChange {
                        from: left_value.clone(),
                        to: right_value.clone(),
                    },
                );
            }
            Some(_) => {}
        }
    }

    for (key, right_value) in right {
        if !left.contains_key(key) {
            diff.added.insert(key.clone(), right_value.clone());
        }
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn swapping_arguments_yields_complementary_diff() {
        let a = map(&[("timeout", "30"), ("retries", "3")]);
        let b = map(&[("timeout", "45"), ("region", "east")]);

        let forward = diff_maps(&a, &b);
        let backward = diff_maps(&b, &a);

        assert_eq!(forward.added, backward.removed);
        assert_eq!(forward.removed, backward.added);
        assert_eq!(
            forward.changed.keys().collect::<Vec<_>>(),
            backward.changed.keys().collect::<Vec<_>>()
        );
        assert_eq!(forward.changed["timeout"].from, "30");
        assert_eq!(backward.changed["timeout"].from, "45");
    }

    #[test]
    fn identical_maps_have_empty_diff() {
        let a = map(&[("k", "v")]);
        assert!(diff_maps(&a, &a).is_empty());
    }
}
