//! Error types for dynamic JSON comparison

use std::fmt;

use thiserror::Error;

use crate::registry::DynamicKind;

/// Which of the two compared documents an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Actual,
    Expected,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Actual => f.write_str("actual"),
            Side::Expected => f.write_str("expected"),
        }
    }
}

#[derive(Error, Debug)]
pub enum CompareError {
    #[error("invalid JSON in {side} document: {source}")]
    InvalidJson {
        side: Side,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown validation type: {kind} (at {path})")]
    UnknownKind { kind: String, path: String },

    #[error("type mismatch at {path}: expected {expected}, got {actual}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("length mismatch at {path}: expected {expected} elements, got {actual}")]
    LengthMismatch {
        path: String,
        expected: usize,
        actual: usize,
    },

    #[error("missing field: {path}")]
    MissingField { path: String },

    #[error("field {path:?} value {value:?} is not a valid {kind}")]
    PredicateFailed {
        kind: DynamicKind,
        path: String,
        value: String,
    },

    #[error("documents differ after normalization\nexpected: {expected}\nactual:   {actual}")]
    Inequality { expected: String, actual: String },

    #[error("failed to serialize normalized document: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl CompareError {
    /// Path at which the comparison failed, when the failure has one
    pub fn path(&self) -> Option<&str> {
        match self {
            CompareError::UnknownKind { path, .. }
            | CompareError::TypeMismatch { path, .. }
            | CompareError::LengthMismatch { path, .. }
            | CompareError::MissingField { path }
            | CompareError::PredicateFailed { path, .. } => Some(path),
            _ => None,
        }
    }
}

pub type CompareResult<T> = Result<T, CompareError>;
