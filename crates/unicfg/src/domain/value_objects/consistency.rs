//! Consistency rules - Typed predicates over observed subsystem state
//!
//! Rules are a closed set of predicate variants evaluated by an interpreter
//! in the application layer. Fields are addressed with dotted paths into the
//! JSON form of the observed entity (e.g. `metadata.version`).

use serde::{Deserialize, Serialize};

use super::ServiceName;
use crate::domain::errors::DomainError;

/// Predicate evaluated against one service's observed state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConsistencyPredicate {
    /// Observed version is at least `min`
    VersionAtLeast { min: u64 },
    /// Field equals a literal value
    FieldEquals {
        field: String,
        value: serde_json::Value,
    },
    /// Field is present and not null
    ReferenceNotNull { field: String },
    /// Field equals a field of a sibling service's state
    ReferenceMatches {
        field: String,
        sibling: ServiceName,
        sibling_field: String,
    },
    /// Checksum equals the sibling service's checksum
    ChecksumMatches { sibling: ServiceName },
}

/// A named rule bound to one service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyRule {
    pub service: ServiceName,
    pub predicate: ConsistencyPredicate,
    pub description: String,
}

impl ConsistencyRule {
    pub fn new(
        service: ServiceName,
        predicate: ConsistencyPredicate,
        description: impl Into<String>,
    ) -> Self {
        Self {
            service,
            predicate,
            description: description.into(),
        }
    }
}

/// Snapshot of one service's state as seen by the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedState {
    pub version: u64,
    pub fields: serde_json::Value,
    pub checksum: Option<String>,
}

impl ObservedState {
    /// Observe a serializable entity at a given version
    pub fn of<T: Serialize>(version: u64, entity: &T) -> Result<Self, DomainError> {
        let fields = serde_json::to_value(entity)
            .map_err(|e| DomainError::Serialization(e.to_string()))?;
        Ok(Self {
            version,
            fields,
            checksum: None,
        })
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    /// Look up a dotted path such as `metadata.version`
    pub fn field(&self, path: &str) -> Option<&serde_json::Value> {
        path.split('.')
            .try_fold(&self.fields, |value, segment| match value {
                serde_json::Value::Object(map) => map.get(segment),
                serde_json::Value::Array(items) => {
                    segment.parse::<usize>().ok().and_then(|i| items.get(i))
                }
                _ => None,
            })
    }
}

/// A rule that did not hold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyViolation {
    pub service: ServiceName,
    pub description: String,
    pub detail: String,
}

impl std::fmt::Display for ConsistencyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.service, self.description, self.detail)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub is_consistent: bool,
    pub violations: Vec<ConsistencyViolation>,
}

impl ConsistencyReport {
    pub fn from_violations(violations: Vec<ConsistencyViolation>) -> Self {
        Self {
            is_consistent: violations.is_empty(),
            violations,
        }
    }
}
