//! Domain Errors
//!
//! `DomainError` is what subsystem ports return. `CoordinationError` is the
//! classified error a caller of the coordinator sees; every variant names
//! the subsystem, operation and transaction where one is involved.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::{
    ConsistencyViolation, Operation, ServiceName, ValidationResult,
};

/// Domain layer errors
#[derive(Debug, Clone, Error)]
pub enum DomainError {
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("{service} {operation} timed out after {budget_ms}ms")]
    Timeout {
        service: ServiceName,
        operation: Operation,
        budget_ms: u64,
    },

    #[error("Dependency {dependency} unavailable: {message}")]
    DependencyUnavailable {
        dependency: ServiceName,
        message: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DomainError {
    pub fn not_found<T: AsRef<str>>(entity_type: T, id: Uuid) -> Self {
        Self::NotFound {
            entity_type: entity_type.as_ref().to_string(),
            id: id.to_string(),
        }
    }
}

/// Where in a unit of work a failure happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureContext {
    pub service: ServiceName,
    pub operation: Operation,
    /// 1-based step index within the workflow; 0 for calls outside a workflow
    pub step: usize,
    pub transaction_id: Uuid,
}

impl FailureContext {
    pub fn new(service: ServiceName, operation: Operation, step: usize, transaction_id: Uuid) -> Self {
        Self {
            service,
            operation,
            step,
            transaction_id,
        }
    }
}

impl std::fmt::Display for FailureContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.step == 0 {
            write!(
                f,
                "{} {} (correlation {})",
                self.service, self.operation, self.transaction_id
            )
        } else {
            write!(
                f,
                "{} {} (step {}, transaction {})",
                self.service, self.operation, self.step, self.transaction_id
            )
        }
    }
}

/// Kinds of external references that block deleting an aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependentKind {
    ActiveConversation,
    DerivedRoleTemplate,
    SharedPersonality,
    ScheduledTask,
}

impl DependentKind {
    fn label(self, count: usize) -> &'static str {
        match (self, count == 1) {
            (DependentKind::ActiveConversation, true) => "active conversation",
            (DependentKind::ActiveConversation, false) => "active conversations",
            (DependentKind::DerivedRoleTemplate, true) => "role derived from this role",
            (DependentKind::DerivedRoleTemplate, false) => "roles derived from this role",
            (DependentKind::SharedPersonality, true) => "other agent sharing this personality",
            (DependentKind::SharedPersonality, false) => "other agents sharing this personality",
            (DependentKind::ScheduledTask, true) => "scheduled task",
            (DependentKind::ScheduledTask, false) => "scheduled tasks",
        }
    }
}

/// A counted group of active dependents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependent {
    pub kind: DependentKind,
    pub count: usize,
}

impl Dependent {
    pub fn new(kind: DependentKind, count: usize) -> Self {
        Self { kind, count }
    }
}

impl std::fmt::Display for Dependent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.count, self.kind.label(self.count))
    }
}

fn join_display<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Classified coordinator errors
#[derive(Debug, Clone, Error)]
pub enum CoordinationError {
    #[error("Validation failed: {}", .0.summary())]
    Validation(ValidationResult),

    #[error("{context} failed: {source}")]
    Communication {
        context: FailureContext,
        source: DomainError,
    },

    #[error("{context} failed because upstream {upstream} failed: {source}")]
    Cascading {
        context: FailureContext,
        upstream: ServiceName,
        source: DomainError,
    },

    #[error(
        "Version conflict on agent {agent_id}: expected version {expected}, observed {observed}; reload the configuration and retry"
    )]
    VersionConflict {
        agent_id: Uuid,
        expected: u64,
        observed: u64,
    },

    #[error(
        "Rollback of {service} failed (transaction {transaction_id}): {message}; original failure: {original}"
    )]
    Rollback {
        service: ServiceName,
        transaction_id: Uuid,
        message: String,
        original: Box<CoordinationError>,
    },

    #[error(
        "Cannot delete agent {agent_id}: blocked by {}; end or detach these dependents first",
        join_display(.dependents)
    )]
    DependencyViolation {
        agent_id: Uuid,
        dependents: Vec<Dependent>,
    },

    #[error("Circuit open for {} service; {context} was not attempted, retry after {retry_after_ms}ms", .context.service)]
    CircuitOpen {
        context: FailureContext,
        retry_after_ms: u64,
    },

    #[error("Agent configuration not found: {0}")]
    NotFound(Uuid),

    #[error("No workflow recorded for transaction {0}")]
    WorkflowNotFound(Uuid),

    #[error(
        "Agent {agent_id} has an unfinished rollback (transaction {transaction_id}); recover it before changing the configuration"
    )]
    RecoveryPending { agent_id: Uuid, transaction_id: Uuid },

    #[error("Configuration for agent {agent_id} is inconsistent: {}", join_display(.violations))]
    Inconsistent {
        agent_id: Uuid,
        violations: Vec<ConsistencyViolation>,
    },
}

impl CoordinationError {
    /// The subsystem the failure is attributed to, if any
    pub fn service(&self) -> Option<ServiceName> {
        match self {
            Self::Communication { context, .. }
            | Self::Cascading { context, .. }
            | Self::CircuitOpen { context, .. } => Some(context.service),
            Self::Rollback { original, .. } => original.service(),
            _ => None,
        }
    }

    /// Transaction / correlation id, if the failure happened inside a unit of work
    pub fn transaction_id(&self) -> Option<Uuid> {
        match self {
            Self::Communication { context, .. }
            | Self::Cascading { context, .. }
            | Self::CircuitOpen { context, .. } => Some(context.transaction_id),
            Self::Rollback { transaction_id, .. }
            | Self::RecoveryPending { transaction_id, .. } => Some(*transaction_id),
            _ => None,
        }
    }

    pub fn is_cascade(&self) -> bool {
        match self {
            Self::Cascading { .. } => true,
            Self::Rollback { original, .. } => original.is_cascade(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::ValidationIssue;

    #[test]
    fn test_communication_message_names_service_and_step() {
        let tx = Uuid::new_v4();
        let err = CoordinationError::Communication {
            context: FailureContext::new(ServiceName::Role, Operation::Create, 2, tx),
            source: DomainError::ExternalService("role store offline".to_string()),
        };
        let message = err.to_string();

        assert!(message.contains("Role create"));
        assert!(message.contains("step 2"));
        assert!(message.contains(&tx.to_string()));
        assert!(message.contains("role store offline"));
        assert_eq!(err.service(), Some(ServiceName::Role));
    }

    #[test]
    fn test_rollback_error_keeps_both_failures() {
        let tx = Uuid::new_v4();
        let original = CoordinationError::Communication {
            context: FailureContext::new(ServiceName::Agent, Operation::Create, 3, tx),
            source: DomainError::ExternalService("agent store offline".to_string()),
        };
        let err = CoordinationError::Rollback {
            service: ServiceName::Role,
            transaction_id: tx,
            message: "role store locked".to_string(),
            original: Box::new(original),
        };
        let message = err.to_string();

        assert!(message.contains("Rollback of Role failed"));
        assert!(message.contains("role store locked"));
        assert!(message.contains("agent store offline"));
        assert_eq!(err.service(), Some(ServiceName::Agent));
    }

    #[test]
    fn test_dependency_violation_enumerates_dependents() {
        let err = CoordinationError::DependencyViolation {
            agent_id: Uuid::new_v4(),
            dependents: vec![
                Dependent::new(DependentKind::ActiveConversation, 3),
                Dependent::new(DependentKind::DerivedRoleTemplate, 1),
            ],
        };
        let message = err.to_string();

        assert!(message.contains("3 active conversations"));
        assert!(message.contains("1 role derived from this role"));
    }

    #[test]
    fn test_validation_message_includes_codes() {
        let err = CoordinationError::Validation(ValidationResult::from_errors(vec![
            ValidationIssue::new("agent.model", "REQUIRED", "model is required"),
        ]));
        assert!(err.to_string().contains("agent.model [REQUIRED]"));
    }
}
