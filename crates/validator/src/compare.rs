//! Structural comparison and normalization of actual vs expected JSON

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{CompareError, CompareResult, Side};
use crate::path::JsonPath;
use crate::placeholder;
use crate::registry::{Registry, DEFAULT_REGISTRY};

/// Compare a response body against a fixture using the default registry.
///
/// Fails on the first problem found.
pub fn validate_dynamic_json(actual: &[u8], expected: &[u8]) -> CompareResult<()> {
    Comparator::new(&DEFAULT_REGISTRY).validate_dynamic_json(actual, expected)
}

/// Walks actual and expected documents in lockstep, driven by the expected
/// shape, validating placeholders against a [`Registry`].
#[derive(Debug, Clone, Copy)]
pub struct Comparator<'r> {
    registry: &'r Registry,
}

impl<'r> Comparator<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// Parse both documents, normalize, and require final equality
    pub fn validate_dynamic_json(&self, actual: &[u8], expected: &[u8]) -> CompareResult<()> {
        let (actual, expected) = self.normalize_bytes(actual, expected)?;
        assert_equal(&actual, &expected)
    }

    /// Parse both documents and return them normalized
    pub fn normalize_bytes(&self, actual: &[u8], expected: &[u8]) -> CompareResult<(Value, Value)> {
        let actual: Value = serde_json::from_slice(actual).map_err(|source| {
            CompareError::InvalidJson {
                side: Side::Actual,
                source,
            }
        })?;
        let expected: Value = serde_json::from_slice(expected).map_err(|source| {
            CompareError::InvalidJson {
                side: Side::Expected,
                source,
            }
        })?;

        self.normalize(actual, expected)
    }

    /// Validate every placeholder and replace it, on both sides, with the
    /// kind's canonical token.
    pub fn normalize(&self, mut actual: Value, mut expected: Value) -> CompareResult<(Value, Value)> {
        self.walk(&mut actual, &mut expected, &JsonPath::root())?;
        Ok((actual, expected))
    }

    /// In-place variant of [`Comparator::validate_dynamic_json`] for trees the
    /// caller already owns
    pub fn compare(&self, actual: &mut Value, expected: &mut Value) -> CompareResult<()> {
        self.walk(actual, expected, &JsonPath::root())?;
        assert_equal(actual, expected)
    }

    fn walk(&self, actual: &mut Value, expected: &mut Value, path: &JsonPath) -> CompareResult<()> {
        match expected {
            Value::Object(expected_map) => self.walk_object(actual, expected_map, path),
            Value::Array(expected_items) => self.walk_array(actual, expected_items, path),
            Value::String(text) => {
                let Some(kind) = placeholder::parse_kind(text) else {
                    return Ok(());
                };
                let token = self.check_placeholder(actual, kind, path)?;
                *actual = Value::String(token.to_string());
                *expected = Value::String(token.to_string());
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn walk_object(
        &self,
        actual: &mut Value,
        expected: &mut Map<String, Value>,
        path: &JsonPath,
    ) -> CompareResult<()> {
        let actual_map = match actual {
            Value::Object(map) => map,
            other => return Err(type_mismatch(path, "object", other)),
        };

        // Keys only present in actual are not checked.
        for (key, expected_child) in expected.iter_mut() {
            let child_path = path.key(key);
            let actual_child = actual_map
                .get_mut(key)
                .ok_or_else(|| CompareError::MissingField {
                    path: child_path.to_string(),
                })?;
            self.walk(actual_child, expected_child, &child_path)?;
        }

        Ok(())
    }

    fn walk_array(
        &self,
        actual: &mut Value,
        expected: &mut [Value],
        path: &JsonPath,
    ) -> CompareResult<()> {
        let actual_items = match actual {
            Value::Array(items) => items,
            other => return Err(type_mismatch(path, "array", other)),
        };

        if actual_items.len() != expected.len() {
            return Err(CompareError::LengthMismatch {
                path: path.to_string(),
                expected: expected.len(),
                actual: actual_items.len(),
            });
        }

        for (i, (actual_item, expected_item)) in
            actual_items.iter_mut().zip(expected.iter_mut()).enumerate()
        {
            self.walk(actual_item, expected_item, &path.index(i))?;
        }

        Ok(())
    }

    fn check_placeholder(
        &self,
        actual: &Value,
        kind: &str,
        path: &JsonPath,
    ) -> CompareResult<&'static str> {
        let descriptor = self
            .registry
            .lookup(kind)
            .map_err(|unknown| CompareError::UnknownKind {
                kind: unknown.0,
                path: path.to_string(),
            })?;

        let value = match actual {
            Value::String(value) => value,
            other => return Err(type_mismatch(path, "string", other)),
        };

        if !descriptor.validate(value, self.registry.now()) {
            debug!(path = %path, kind = %descriptor.kind(), value = %value, "dynamic value rejected");
            return Err(CompareError::PredicateFailed {
                kind: descriptor.kind(),
                path: path.to_string(),
                value: value.clone(),
            });
        }

        Ok(descriptor.canonical_token())
    }
}

fn type_mismatch(path: &JsonPath, expected: &'static str, actual: &Value) -> CompareError {
    CompareError::TypeMismatch {
        path: path.to_string(),
        expected,
        actual: type_name(actual),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Deep equality of two normalized trees. Object key order is ignored,
/// numbers compare by value (`1` equals `1.0`) and keys only present in
/// `actual` are not considered.
fn assert_equal(actual: &Value, expected: &Value) -> CompareResult<()> {
    if json_matches(actual, expected) {
        return Ok(());
    }

    Err(CompareError::Inequality {
        expected: canonical_string(expected)?,
        actual: canonical_string(actual)?,
    })
}

fn json_matches(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                x == y
            } else if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                x == y
            } else {
                x.as_f64() == y.as_f64()
            }
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_matches(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => ys
            .iter()
            .all(|(key, y)| xs.get(key).is_some_and(|x| json_matches(x, y))),
        _ => actual == expected,
    }
}

/// Serialize with object keys sorted at every level
fn canonical_string(value: &Value) -> CompareResult<String> {
    serde_json::to_string(&canonicalize(value)).map_err(CompareError::Serialize)
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by_key(|(key, _)| *key);
            let mut out = Map::with_capacity(entries.len());
            for (key, val) in entries {
                out.insert(key.clone(), canonicalize(val));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
