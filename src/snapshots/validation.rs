//! Structural snapshot checks and document import.

use std::collections::HashSet;

use serde_json::Value;

use crate::error::{ConfigCenterError, ConfigResult, Violation, ViolationReason};
use crate::snapshots::types::SnapshotItem;

/// Every violation in `items`, in item order. Never mutates anything.
pub fn validate_items(items: &[SnapshotItem]) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mut seen = HashSet::new();

    for item in items {
        if item.key.trim().is_empty() {
            violations.push(Violation {
                key: item.key.clone(),
                reason: ViolationReason::EmptyKey,
            });
            continue;
        }
        if !seen.insert(item.key.as_str()) {
            violations.push(Violation {
                key: item.key.clone(),
                reason: ViolationReason::DuplicateKey,
            });
        }
        if item.value.is_none() {
            violations.push(Violation {
                key: item.key.clone(),
                reason: ViolationReason::NullValue,
            });
        }
    }

    violations
}

/// Flatten a JSON object into dotted keys.
///
/// Nested objects recurse, `null` becomes a placeholder, strings are taken
/// verbatim and every other value is stored as its JSON text.
pub fn flatten_document(document: &Value) -> ConfigResult<Vec<SnapshotItem>> {
    let Value::Object(root) = document else {
        return Err(ConfigCenterError::InvalidRequest(
            "configuration document must be an object at the top level".into(),
        ));
    };

    let mut items = Vec::new();
    for (key, value) in root {
        flatten_into(key, value, &mut items);
    }
    Ok(items)
}

fn flatten_into(key: &str, value: &Value, items: &mut Vec<SnapshotItem>) {
    match value {
        Value::Object(children) => {
            for (child, nested) in children {
                flatten_into(&format!("{key}.{child}"), nested, items);
            }
        }
        Value::Null => items.push(SnapshotItem {
            key: key.to_string(),
            value: None,
        }),
        Value::String(s) => items.push(SnapshotItem::new(key, s.clone())),
        other => items.push(SnapshotItem::new(key, other.to_string())),
    }
}
