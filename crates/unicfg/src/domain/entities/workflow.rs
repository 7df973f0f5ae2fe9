//! WorkflowState - Record of one unit of work
//!
//! Created when a coordinator operation starts, mutated as each step runs,
//! then kept in the workflow journal for audit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::{Operation, ServiceName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
    RolledBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    /// Never executed because an earlier step failed
    Unreachable,
    Compensated,
}

/// A step the workflow intends to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub service: ServiceName,
    pub operation: Operation,
    pub depends_on: Vec<ServiceName>,
}

impl PlannedStep {
    pub fn new(service: ServiceName, operation: Operation) -> Self {
        Self {
            service,
            operation,
            depends_on: Vec::new(),
        }
    }

    pub fn after(mut self, services: &[ServiceName]) -> Self {
        self.depends_on.extend_from_slice(services);
        self
    }

    /// Plan that runs `steps` strictly one after another
    pub fn chain(steps: &[(ServiceName, Operation)]) -> Vec<PlannedStep> {
        let mut previous: Option<ServiceName> = None;
        steps
            .iter()
            .map(|(service, operation)| {
                let step = PlannedStep::new(*service, *operation);
                let step = match previous {
                    Some(prev) => step.after(&[prev]),
                    None => step,
                };
                previous = Some(*service);
                step
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub service: ServiceName,
    pub operation: Operation,
    pub depends_on: Vec<ServiceName>,
    pub status: StepStatus,
    /// Entity the step acted on (personality/role/agent id; agent id for File)
    pub entity_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationRecord {
    pub service: ServiceName,
    pub entity_id: Uuid,
    pub succeeded: bool,
    pub message: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub transaction_id: Uuid,
    pub agent_id: Option<Uuid>,
    pub operation: Operation,
    pub steps: Vec<StepRecord>,
    pub completed: Vec<ServiceName>,
    pub failed: Vec<ServiceName>,
    pub compensations: Vec<CompensationRecord>,
    pub status: WorkflowStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowState {
    pub fn begin(operation: Operation, agent_id: Option<Uuid>, plan: Vec<PlannedStep>) -> Self {
        Self {
            transaction_id: Uuid::new_v4(),
            agent_id,
            operation,
            steps: plan
                .into_iter()
                .map(|p| StepRecord {
                    service: p.service,
                    operation: p.operation,
                    depends_on: p.depends_on,
                    status: StepStatus::Pending,
                    entity_id: None,
                    started_at: None,
                    finished_at: None,
                    error: None,
                })
                .collect(),
            completed: Vec::new(),
            failed: Vec::new(),
            compensations: Vec::new(),
            status: WorkflowStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    fn index_of(&self, service: ServiceName) -> Option<usize> {
        self.steps.iter().position(|s| s.service == service)
    }

    pub fn step(&self, service: ServiceName) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.service == service)
    }

    /// Mark a planned step as running.
    ///
    /// Returns the 1-based step number and the step's operation, or `None`
    /// when the step is not pending or one of its dependencies has not
    /// completed.
    pub fn start_step(&mut self, service: ServiceName) -> Option<(usize, Operation)> {
        let index = self.index_of(service)?;
        if self.steps[index].status != StepStatus::Pending {
            return None;
        }
        let ready = self.steps[index]
            .depends_on
            .iter()
            .all(|dep| self.completed.contains(dep));
        if !ready {
            return None;
        }
        let step = &mut self.steps[index];
        step.status = StepStatus::Running;
        step.started_at = Some(Utc::now());
        Some((index + 1, step.operation))
    }

    pub fn complete_step(&mut self, service: ServiceName, entity_id: Uuid) {
        if let Some(index) = self.index_of(service) {
            let step = &mut self.steps[index];
            step.status = StepStatus::Completed;
            step.entity_id = Some(entity_id);
            step.finished_at = Some(Utc::now());
            self.completed.push(service);
        }
    }

    /// Mark a step failed and every still-pending step unreachable.
    ///
    /// Returns the services that became unreachable.
    pub fn fail_step(&mut self, service: ServiceName, error: &str) -> Vec<ServiceName> {
        if let Some(index) = self.index_of(service) {
            let step = &mut self.steps[index];
            step.status = StepStatus::Failed;
            step.error = Some(error.to_string());
            step.finished_at = Some(Utc::now());
        }
        self.failed.push(service);

        let mut unreachable = Vec::new();
        for step in self.steps.iter_mut().filter(|s| s.status == StepStatus::Pending) {
            step.status = StepStatus::Unreachable;
            unreachable.push(step.service);
        }
        unreachable
    }

    /// Completed, not yet compensated steps in reverse completion order
    pub fn pending_compensation(&self) -> Vec<(ServiceName, Uuid)> {
        self.completed
            .iter()
            .rev()
            .filter_map(|service| {
                self.step(*service)
                    .filter(|s| s.status == StepStatus::Completed)
                    .and_then(|s| s.entity_id.map(|id| (*service, id)))
            })
            .collect()
    }

    pub fn record_compensation(
        &mut self,
        service: ServiceName,
        entity_id: Uuid,
        outcome: Result<(), String>,
    ) {
        let succeeded = outcome.is_ok();
        if succeeded {
            if let Some(index) = self.index_of(service) {
                self.steps[index].status = StepStatus::Compensated;
            }
        }
        self.compensations.push(CompensationRecord {
            service,
            entity_id,
            succeeded,
            message: outcome.err(),
            at: Utc::now(),
        });
    }

    pub fn finish(&mut self, status: WorkflowStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    /// Milliseconds from start to finish (or to now while running)
    pub fn elapsed_ms(&self) -> i64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds()
    }
}
