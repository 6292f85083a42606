//! Dynamic-value-aware JSON comparison
//!
//! Compares a captured HTTP JSON response against a hand-written fixture in
//! which non-deterministic fields are written as placeholders such as
//! `"{{DYNAMIC_UUID}}"` or `"{{DYNAMIC_RECENT_TIMESTAMP}}"`.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  validate_dynamic_json(actual, expected)                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Comparator                                                 │
//! │    ├── parse both documents -> serde_json::Value            │
//! │    ├── walk expected shape (objects, arrays, placeholders)  │
//! │    │     └── Registry::lookup(kind) -> ValidatorDescriptor  │
//! │    ├── replace validated values with canonical tokens       │
//! │    └── final deep equality of the normalized trees          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  placeholder::scan(expected) -> [(path, kind)]              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Expected objects are patterns, not schemas: keys present only in the
//! actual document are ignored. Arrays must match in length.
//!
//! ```
//! use componenttest_validator::validate_dynamic_json;
//!
//! let actual = br#"{"id":"2bcbce7d-d0a6-427e-9334-dda37f62a81b","name":"x"}"#;
//! let expected = br#"{"id":"{{DYNAMIC_UUID}}","name":"x"}"#;
//! assert!(validate_dynamic_json(actual, expected).is_ok());
//! ```

pub mod compare;
pub mod error;
pub mod path;
pub mod placeholder;
pub mod predicates;
pub mod registry;

pub use compare::{validate_dynamic_json, Comparator};
pub use error::{CompareError, CompareResult, Side};
pub use path::JsonPath;
pub use placeholder::Placeholder;
pub use registry::{Clock, DynamicKind, FixedClock, Registry, SystemClock, ValidatorDescriptor};
