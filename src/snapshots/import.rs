//! Configuration file import.
//!
//! Turns a JSON, YAML or `.properties` file into flat key/value items. Nested
//! maps become dotted keys the same way snapshot documents do, so the result
//! goes through the same structural validation before anything is written.

use std::str::FromStr;

use serde_json::Value;

use crate::error::{ConfigCenterError, ConfigResult};
use crate::snapshots::types::SnapshotItem;
use crate::snapshots::validation::flatten_document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Json,
    Yaml,
    Properties,
}

impl FromStr for ImportFormat {
    type Err = ConfigCenterError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "json" => Ok(ImportFormat::Json),
            "yaml" | "yml" => Ok(ImportFormat::Yaml),
            "properties" => Ok(ImportFormat::Properties),
            _ => Err(ConfigCenterError::InvalidRequest(format!(
                "unsupported import format: {raw} (expected json, yaml or properties)"
            ))),
        }
    }
}

impl std::fmt::Display for ImportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ImportFormat::Json => "json",
            ImportFormat::Yaml => "yaml",
            ImportFormat::Properties => "properties",
        })
    }
}

/// Parse `content` into items in document order.
pub fn parse_document(format: ImportFormat, content: &str) -> ConfigResult<Vec<SnapshotItem>> {
    match format {
        ImportFormat::Json => {
            let document: Value = serde_json::from_str(content)
                .map_err(|e| ConfigCenterError::InvalidRequest(format!("invalid JSON: {e}")))?;
            flatten_document(&document)
        }
        ImportFormat::Yaml => {
            let document: Value = serde_yaml::from_str(content)
                .map_err(|e| ConfigCenterError::InvalidRequest(format!("invalid YAML: {e}")))?;
            flatten_document(&document)
        }
        ImportFormat::Properties => Ok(parse_properties(content)),
    }
}

/// `key=value` / `key: value` lines; `#` and `!` start comments and a
/// trailing backslash continues the value on the next line.
fn parse_properties(content: &str) -> Vec<SnapshotItem> {
    let mut items = Vec::new();
    let mut pending = String::new();

    for line in content.lines() {
        let line = line.trim_start();
        if pending.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
            continue;
        }

        if let Some(continued) = line.strip_suffix('\\') {
            pending.push_str(continued);
            continue;
        }
        pending.push_str(line);

        let logical = std::mem::take(&mut pending);
        let (key, value) = match logical.find(['=', ':']) {
            Some(at) => (&logical[..at], &logical[at + 1..]),
            None => (logical.as_str(), ""),
        };
        items.push(SnapshotItem::new(key.trim(), value.trim_start()));
    }

    if !pending.is_empty() {
        let (key, value) = pending.split_once(['=', ':']).unwrap_or((pending.as_str(), ""));
        items.push(SnapshotItem::new(key.trim(), value.trim_start()));
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: Vec<SnapshotItem>) -> Vec<(String, String)> {
        items
            .into_iter()
            .map(|i| (i.key, i.value.unwrap_or_default()))
            .collect()
    }

    #[test]
    fn yaml_is_flattened_like_json() {
        let yaml = "db:\n  pool:\n    size: 10\n  host: db.internal\nhosts:\n  - a\n  - b\n";
        let mut items = pairs(parse_document(ImportFormat::Yaml, yaml).unwrap());
        items.sort();
        assert_eq!(
            items,
            vec![
                ("db.host".to_string(), "db.internal".to_string()),
                ("db.pool.size".to_string(), "10".to_string()),
                ("hosts".to_string(), r#"["a","b"]"#.to_string()),
            ]
        );
    }

    #[test]
    fn properties_skip_comments_and_join_continuations() {
        let content = "# service\n! legacy comment\ntimeout = 30\nregion:east\nurls=http://a,\\\n    http://b\nflag\n";
        assert_eq!(
            pairs(parse_document(ImportFormat::Properties, content).unwrap()),
            vec![
                ("timeout".to_string(), "30".to_string()),
                ("region".to_string(), "east".to_string()),
                ("urls".to_string(), "http://a,http://b".to_string()),
                ("flag".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn formats_parse_case_insensitively() {
        assert_eq!("YML".parse::<ImportFormat>().unwrap(), ImportFormat::Yaml);
        assert!(matches!(
            "xml".parse::<ImportFormat>(),
            Err(ConfigCenterError::InvalidRequest(_))
        ));
    }

    #[test]
    fn malformed_json_is_an_invalid_request() {
        assert!(matches!(
            parse_document(ImportFormat::Json, "{ not json"),
            Err(ConfigCenterError::InvalidRequest(_))
        ));
    }
}
