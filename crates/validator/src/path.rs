//! Dotted/bracketed coordinates into a JSON tree, e.g. `data.items[2].id`

use std::fmt;

/// Location of a value inside a JSON document.
///
/// Only used to make failures readable; it is never parsed back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct JsonPath(String);

impl JsonPath {
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Path of an object member below this one
    pub fn key(&self, key: &str) -> Self {
        if self.0.is_empty() {
            Self(key.to_string())
        } else {
            Self(format!("{}.{}", self.0, key))
        }
    }

    /// Path of an array element below this one
    pub fn index(&self, index: usize) -> Self {
        Self(format!("{}[{}]", self.0, index))
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("$")
        } else {
            f.write_str(&self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_path() {
        let path = JsonPath::root().key("data").key("items").index(2).key("id");
        assert_eq!(path.to_string(), "data.items[2].id");
    }

    #[test]
    fn test_root_and_top_level_array() {
        assert_eq!(JsonPath::root().to_string(), "$");
        assert_eq!(JsonPath::root().index(0).to_string(), "[0]");
        assert!(JsonPath::root().is_root());
    }
}
