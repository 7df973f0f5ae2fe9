//! Unicfg API Routes
//!
//! - /unicfg/configurations - Unified configuration lifecycle
//! - /unicfg/configurations/:id/consistency - Cross-subsystem consistency report
//! - /unicfg/recovery/rollback - Re-run compensation for a failed workflow
//! - /unicfg/workflows - Workflow journal
//! - /unicfg/circuits - Circuit breaker state per subsystem

pub mod configurations;
pub mod operations;
pub mod swagger;

use axum::http::StatusCode;

use unicfg::CoordinationError;

/// Map a coordinator error to the status and message handlers return
pub fn error_response(err: CoordinationError) -> (StatusCode, String) {
    let status = match &err {
        CoordinationError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CoordinationError::NotFound(_) | CoordinationError::WorkflowNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        CoordinationError::DependencyViolation { .. }
        | CoordinationError::VersionConflict { .. }
        | CoordinationError::RecoveryPending { .. } => StatusCode::CONFLICT,
        CoordinationError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
        CoordinationError::Communication { .. }
        | CoordinationError::Cascading { .. }
        | CoordinationError::Rollback { .. } => StatusCode::BAD_GATEWAY,
        CoordinationError::Inconsistent { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(
            transaction_id = ?err.transaction_id(),
            service = ?err.service(),
            "Request failed: {}",
            err
        );
    }
    (status, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use unicfg::{DomainError, FailureContext, Operation, ServiceName, ValidationResult};
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let context =
            FailureContext::new(ServiceName::Role, Operation::Create, 1, Uuid::new_v4());
        let communication = CoordinationError::Communication {
            context: context.clone(),
            source: DomainError::Timeout {
                service: ServiceName::Role,
                operation: Operation::Create,
                budget_ms: 200,
            },
        };

        assert_eq!(
            error_response(CoordinationError::Validation(ValidationResult::valid())).0,
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            error_response(CoordinationError::NotFound(Uuid::new_v4())).0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_response(CoordinationError::VersionConflict {
                agent_id: Uuid::new_v4(),
                expected: 1,
                observed: 2,
            })
            .0,
            StatusCode::CONFLICT
        );
        assert_eq!(
            error_response(CoordinationError::RecoveryPending {
                agent_id: Uuid::new_v4(),
                transaction_id: Uuid::new_v4(),
            })
            .0,
            StatusCode::CONFLICT
        );
        assert_eq!(
            error_response(CoordinationError::CircuitOpen {
                context: context.clone(),
                retry_after_ms: 500,
            })
            .0,
            StatusCode::SERVICE_UNAVAILABLE
        );

        let (status, message) = error_response(communication);
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(message.contains("Role"));
    }
}
