//! Registry of dynamic value validators, keyed by placeholder kind

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;

use crate::predicates;

/// Prefix shared by every canonical replacement token
pub const VALID_PREFIX: &str = "VALID";

/// Kind of non-deterministic value a placeholder stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DynamicKind {
    Timestamp,
    RecentTimestamp,
    Uuid,
    Url,
    UriPath,
}

impl DynamicKind {
    pub const ALL: [DynamicKind; 5] = [
        DynamicKind::Timestamp,
        DynamicKind::RecentTimestamp,
        DynamicKind::Uuid,
        DynamicKind::Url,
        DynamicKind::UriPath,
    ];

    /// Name as written inside `{{DYNAMIC_<KIND>}}`
    pub fn as_str(&self) -> &'static str {
        match self {
            DynamicKind::Timestamp => "TIMESTAMP",
            DynamicKind::RecentTimestamp => "RECENT_TIMESTAMP",
            DynamicKind::Uuid => "UUID",
            DynamicKind::Url => "URL",
            DynamicKind::UriPath => "URI_PATH",
        }
    }

    /// Token written over a validated value on both sides of a comparison
    pub fn canonical_token(&self) -> &'static str {
        match self {
            DynamicKind::Timestamp => "VALID_TIMESTAMP",
            DynamicKind::RecentTimestamp => "VALID_RECENT_TIMESTAMP",
            DynamicKind::Uuid => "VALID_UUID",
            DynamicKind::Url => "VALID_URL",
            DynamicKind::UriPath => "VALID_URI_PATH",
        }
    }

    fn predicate(&self) -> Predicate {
        match self {
            DynamicKind::Timestamp => timestamp,
            DynamicKind::RecentTimestamp => predicates::validate_recent_timestamp,
            DynamicKind::Uuid => uuid,
            DynamicKind::Url => url,
            DynamicKind::UriPath => uri_path,
        }
    }
}

fn timestamp(value: &str, _now: DateTime<Utc>) -> bool {
    predicates::validate_timestamp(value)
}

fn uuid(value: &str, _now: DateTime<Utc>) -> bool {
    predicates::validate_uuid(value)
}

fn url(value: &str, _now: DateTime<Utc>) -> bool {
    predicates::validate_url(value)
}

fn uri_path(value: &str, _now: DateTime<Utc>) -> bool {
    predicates::validate_uri_path(value)
}

impl fmt::Display for DynamicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A placeholder kind that no validator is registered for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKind(pub String);

impl fmt::Display for UnknownKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown validation type: {}", self.0)
    }
}

impl std::error::Error for UnknownKind {}

impl FromStr for DynamicKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DynamicKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// Decides whether an actual string is an acceptable instance of a kind.
///
/// The second argument is the validation instant.
pub type Predicate = fn(&str, DateTime<Utc>) -> bool;

/// Source of "now" for time-relative validators
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a single instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Validation rule for one kind
#[derive(Clone)]
pub struct ValidatorDescriptor {
    kind: DynamicKind,
    predicate: Predicate,
    canonical_token: &'static str,
}

impl ValidatorDescriptor {
    pub fn new(kind: DynamicKind) -> Self {
        Self {
            kind,
            predicate: kind.predicate(),
            canonical_token: kind.canonical_token(),
        }
    }

    pub fn kind(&self) -> DynamicKind {
        self.kind
    }

    pub fn canonical_token(&self) -> &'static str {
        self.canonical_token
    }

    pub fn validate(&self, value: &str, now: DateTime<Utc>) -> bool {
        (self.predicate)(value, now)
    }
}

impl fmt::Debug for ValidatorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorDescriptor")
            .field("kind", &self.kind)
            .field("canonical_token", &self.canonical_token)
            .finish()
    }
}

/// Immutable kind -> validator table.
///
/// Build one up front and hand it to [`crate::Comparator`]; nothing in it
/// changes while comparisons run.
#[derive(Debug, Clone)]
pub struct Registry {
    validators: HashMap<DynamicKind, ValidatorDescriptor>,
    clock: Arc<dyn Clock>,
}

/// Registry with every built-in kind and the system clock
pub static DEFAULT_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

impl Registry {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Registry with every built-in kind, evaluating recency against `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_kinds(&DynamicKind::ALL, clock)
    }

    /// Registry restricted to the given kinds
    pub fn with_kinds(kinds: &[DynamicKind], clock: Arc<dyn Clock>) -> Self {
        let validators = kinds
            .iter()
            .map(|kind| (*kind, ValidatorDescriptor::new(*kind)))
            .collect();
        Self { validators, clock }
    }

    /// Find the validator for a kind name as written in a placeholder
    pub fn lookup(&self, kind: &str) -> Result<&ValidatorDescriptor, UnknownKind> {
        let parsed: DynamicKind = kind.parse()?;
        self.validators
            .get(&parsed)
            .ok_or_else(|| UnknownKind(kind.to_string()))
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn kinds(&self) -> impl Iterator<Item = DynamicKind> + '_ {
        self.validators.keys().copied()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_has_all_kinds() {
        let registry = Registry::new();
        for kind in DynamicKind::ALL {
            let descriptor = registry.lookup(kind.as_str()).unwrap();
            assert_eq!(descriptor.kind(), kind);
            assert_eq!(
                descriptor.canonical_token(),
                format!("{}_{}", VALID_PREFIX, kind.as_str())
            );
        }
    }

    #[test]
    fn test_unknown_kind() {
        let registry = Registry::new();
        let err = registry.lookup("FOOBAR").unwrap_err();
        assert_eq!(err, UnknownKind("FOOBAR".to_string()));
        assert!(err.to_string().contains("FOOBAR"));
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        assert!(Registry::new().lookup("uuid").is_err());
    }

    #[test]
    fn test_restricted_registry_rejects_missing_kind() {
        let registry = Registry::with_kinds(&[DynamicKind::Uuid], Arc::new(SystemClock));
        assert!(registry.lookup("UUID").is_ok());
        assert!(registry.lookup("URL").is_err());
        assert_eq!(registry.kinds().count(), 1);
    }
}
