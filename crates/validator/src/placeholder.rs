//! Locating `{{DYNAMIC_<KIND>}}` placeholders in an expected document

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::path::JsonPath;

// Anchored: the whole string must be the placeholder.
static DYNAMIC_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\{\{DYNAMIC_([A-Z_0-9]+)\}\}$").expect("placeholder pattern is valid")
});

/// A placeholder found in an expected document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub path: JsonPath,
    /// Kind exactly as written; it may not be a registered kind
    pub kind: String,
}

/// Kind named by a placeholder string, or `None` for an ordinary string
pub fn parse_kind(value: &str) -> Option<&str> {
    DYNAMIC_PATTERN
        .captures(value)
        .and_then(|caps| caps.get(1))
        .map(|kind| kind.as_str())
}

pub fn is_placeholder(value: &str) -> bool {
    parse_kind(value).is_some()
}

/// Every placeholder in `expected`, depth-first in document order
pub fn scan(expected: &Value) -> Vec<Placeholder> {
    let mut found = Vec::new();
    scan_into(expected, &JsonPath::root(), &mut found);
    found
}

fn scan_into(value: &Value, path: &JsonPath, found: &mut Vec<Placeholder>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                scan_into(child, &path.key(key), found);
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                scan_into(item, &path.index(i), found);
            }
        }
        Value::String(text) => {
            if let Some(kind) = parse_kind(text) {
                found.push(Placeholder {
                    path: path.clone(),
                    kind: kind.to_string(),
                });
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_kind() {
        assert_eq!(parse_kind("{{DYNAMIC_UUID}}"), Some("UUID"));
        assert_eq!(parse_kind("{{DYNAMIC_RECENT_TIMESTAMP}}"), Some("RECENT_TIMESTAMP"));
        assert_eq!(parse_kind("{{DYNAMIC_FOOBAR}}"), Some("FOOBAR"));
    }

    #[test]
    fn test_partial_and_malformed_are_plain_strings() {
        assert!(!is_placeholder("not{{DYNAMIC_UUID}}exact"));
        assert!(!is_placeholder("{{DYNAMIC_UUID}"));
        assert!(!is_placeholder("{{DYNAMIC_uuid}}"));
        assert!(!is_placeholder("{{DYNAMIC_}}"));
        assert!(!is_placeholder("{{DYNAMIC_UUID}}\n"));
        assert!(!is_placeholder(" {{DYNAMIC_UUID}}"));
    }

    #[test]
    fn test_scan_nested() {
        let expected = json!({
            "id": "{{DYNAMIC_UUID}}",
            "name": "x",
            "count": 3,
            "data": {
                "items": [
                    {"url": "{{DYNAMIC_URL}}"},
                    "{{DYNAMIC_TIMESTAMP}}",
                    ["{{DYNAMIC_URI_PATH}}", null, true]
                ]
            }
        });

        let mut found: Vec<(String, String)> = scan(&expected)
            .into_iter()
            .map(|p| (p.path.to_string(), p.kind))
            .collect();
        found.sort();

        assert_eq!(
            found,
            vec![
                ("data.items[0].url".to_string(), "URL".to_string()),
                ("data.items[1]".to_string(), "TIMESTAMP".to_string()),
                ("data.items[2][0]".to_string(), "URI_PATH".to_string()),
                ("id".to_string(), "UUID".to_string()),
            ]
        );
    }

    #[test]
    fn test_scan_root_placeholder() {
        let found = scan(&json!("{{DYNAMIC_UUID}}"));
        assert_eq!(found.len(), 1);
        assert!(found[0].path.is_root());
    }
}
