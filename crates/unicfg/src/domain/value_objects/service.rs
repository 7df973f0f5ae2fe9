//! ServiceName / Operation - Subsystem identity and operation kinds

use serde::{Deserialize, Serialize};

/// One of the four subsystems a unified configuration spans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceName {
    Personality,
    Role,
    Agent,
    File,
}

impl ServiceName {
    /// Dependency order used when creating an aggregate
    pub const CREATION_ORDER: [ServiceName; 4] = [
        ServiceName::Personality,
        ServiceName::Role,
        ServiceName::Agent,
        ServiceName::File,
    ];

    /// Services that must have completed before this one may start
    pub fn dependencies(self) -> &'static [ServiceName] {
        match self {
            ServiceName::Personality => &[],
            ServiceName::Role => &[ServiceName::Personality],
            ServiceName::Agent => &[ServiceName::Personality, ServiceName::Role],
            ServiceName::File => &[ServiceName::Agent],
        }
    }

    /// Whether `other` is a direct or transitive upstream dependency
    pub fn depends_on(self, other: ServiceName) -> bool {
        self.dependencies()
            .iter()
            .any(|dep| *dep == other || dep.depends_on(other))
    }
}

impl std::fmt::Display for ServiceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceName::Personality => write!(f, "Personality"),
            ServiceName::Role => write!(f, "Role"),
            ServiceName::Agent => write!(f, "Agent"),
            ServiceName::File => write!(f, "File"),
        }
    }
}

impl std::str::FromStr for ServiceName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "personality" => Ok(ServiceName::Personality),
            "role" => Ok(ServiceName::Role),
            "agent" => Ok(ServiceName::Agent),
            "file" => Ok(ServiceName::File),
            _ => Err(format!("Unknown service: {}", s)),
        }
    }
}

/// Operation performed against a subsystem or a unified configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    Archive,
    Validate,
    Rollback,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Read => write!(f, "read"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
            Operation::Archive => write!(f, "archive"),
            Operation::Validate => write!(f, "validate"),
            Operation::Rollback => write!(f, "rollback"),
        }
    }
}
