//! Recovery, workflow journal and circuit breaker DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use unicfg::{Operation, ServiceName, WorkflowState, WorkflowStatus};

use crate::application::{CircuitStats, JournalEntry};

// ============================================
// Request DTOs
// ============================================

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RollbackRequest {
    /// Workflow to recover; the most recent failed one when omitted
    pub transaction_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WorkflowsQuery {
    /// Maximum number of workflows to return (default 50)
    pub limit: Option<usize>,
}

// ============================================
// Response DTOs
// ============================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RollbackResponse {
    /// False when there was nothing to recover
    pub recovered: bool,
    pub workflow: Option<WorkflowSummary>,
}

impl From<Option<WorkflowState>> for RollbackResponse {
    fn from(workflow: Option<WorkflowState>) -> Self {
        Self {
            recovered: workflow.is_some(),
            workflow: workflow.map(|w| WorkflowSummary::new(w, None)),
        }
    }
}

/// A finished unit of work as recorded in the journal
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WorkflowSummary {
    pub transaction_id: Uuid,
    pub agent_id: Option<Uuid>,
    #[schema(value_type = String)]
    pub operation: Operation,
    #[schema(value_type = String)]
    pub status: WorkflowStatus,
    #[schema(value_type = Vec<String>)]
    pub completed: Vec<ServiceName>,
    #[schema(value_type = Vec<String>)]
    pub failed: Vec<ServiceName>,
    /// Services whose compensation succeeded
    #[schema(value_type = Vec<String>)]
    pub compensated: Vec<ServiceName>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub elapsed_ms: i64,
    pub error: Option<String>,
}

impl WorkflowSummary {
    pub fn new(workflow: WorkflowState, error: Option<String>) -> Self {
        let compensated = workflow
            .compensations
            .iter()
            .filter(|c| c.succeeded)
            .map(|c| c.service)
            .collect();
        Self {
            elapsed_ms: workflow.elapsed_ms(),
            transaction_id: workflow.transaction_id,
            agent_id: workflow.agent_id,
            operation: workflow.operation,
            status: workflow.status,
            completed: workflow.completed,
            failed: workflow.failed,
            compensated,
            started_at: workflow.started_at,
            finished_at: workflow.finished_at,
            error,
        }
    }
}

impl From<JournalEntry> for WorkflowSummary {
    fn from(entry: JournalEntry) -> Self {
        let error = entry.failure.map(|e| e.to_string());
        WorkflowSummary::new(entry.workflow, error)
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CircuitStatsResponse {
    #[schema(value_type = String)]
    pub service: ServiceName,
    /// closed, open or half-open
    pub state: String,
    pub consecutive_failures: u32,
    pub total_calls: u64,
    pub total_failures: u64,
    pub rejected_calls: u64,
    pub retry_after_ms: Option<u64>,
}

impl From<CircuitStats> for CircuitStatsResponse {
    fn from(stats: CircuitStats) -> Self {
        Self {
            service: stats.service,
            state: stats.state.to_string(),
            consecutive_failures: stats.consecutive_failures,
            total_calls: stats.total_calls,
            total_failures: stats.total_failures,
            rejected_calls: stats.rejected_calls,
            retry_after_ms: stats.retry_after_ms,
        }
    }
}
