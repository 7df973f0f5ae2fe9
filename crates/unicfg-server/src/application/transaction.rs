//! Transaction Coordinator
//!
//! Drives one unit of work across the four subsystems. Each step runs only
//! after its declared dependencies completed; on failure the remaining steps
//! are skipped and completed steps are compensated in reverse order.

use std::future::Future;
use std::sync::Arc;

use futures::future::try_join_all;
use tokio::time::{timeout, Instant};
use uuid::Uuid;

use unicfg::{
    Agent, AgentLinks, ConsistencyReport, ConsistencyViolation, CoordinationError, Dependent,
    DependentKind, DomainError, FailureContext, Operation, PlannedStep, ServiceName, TraceEvent,
    TraceObserver, TracePhase, UnifiedConfiguration, UnifiedConfigurationRequest,
    UnifiedConfigurationUpdate, WorkflowState, WorkflowStatus,
};

use super::config::TimingBudgets;
use super::consistency::ConsistencyValidator;
use super::journal::{JournalEntry, WorkflowJournal};
use super::resilience::{CircuitBreakerRegistry, GuardFailure};
use super::subsystems::Subsystems;

/// A compensation call that did not succeed
struct CompensationFailure {
    service: ServiceName,
    message: String,
}

pub struct TransactionCoordinator {
    subsystems: Subsystems,
    breakers: Arc<CircuitBreakerRegistry>,
    consistency: ConsistencyValidator,
    observer: Arc<dyn TraceObserver>,
    journal: Arc<WorkflowJournal>,
    budgets: TimingBudgets,
}

impl TransactionCoordinator {
    pub fn new(
        subsystems: Subsystems,
        breakers: Arc<CircuitBreakerRegistry>,
        observer: Arc<dyn TraceObserver>,
        journal: Arc<WorkflowJournal>,
        budgets: TimingBudgets,
    ) -> Self {
        Self {
            subsystems,
            breakers,
            consistency: ConsistencyValidator::new(),
            observer,
            journal,
            budgets,
        }
    }

    // ============================================
    // Units of work
    // ============================================

    /// Personality -> Role -> Agent -> File
    pub async fn create(
        &self,
        request: &UnifiedConfigurationRequest,
    ) -> Result<UnifiedConfiguration, CoordinationError> {
        let plan = ServiceName::CREATION_ORDER
            .iter()
            .map(|s| PlannedStep::new(*s, Operation::Create).after(s.dependencies()))
            .collect();
        let mut wf = WorkflowState::begin(Operation::Create, None, plan);
        let outcome = self.create_steps(&mut wf, request).await;
        self.finish(wf, outcome).await
    }

    async fn create_steps(
        &self,
        wf: &mut WorkflowState,
        request: &UnifiedConfigurationRequest,
    ) -> Result<UnifiedConfiguration, CoordinationError> {
        let s = &self.subsystems;

        let personality = self
            .run_step(wf, ServiceName::Personality, s.personalities.create(&request.personality), |p| p.id)
            .await?;
        let role = self
            .run_step(wf, ServiceName::Role, s.roles.create(&request.role), |r| r.id)
            .await?;

        let links = AgentLinks {
            personality_id: personality.id,
            role_id: role.id,
            role_name: role.name.clone(),
        };
        let agent = self
            .run_step(wf, ServiceName::Agent, s.agents.create(&request.agent, &links), |a| a.id)
            .await?;
        wf.agent_id = Some(agent.id);

        let config = UnifiedConfiguration {
            personality,
            role,
            agent,
        };
        self.run_step(wf, ServiceName::File, s.files.write(&config), |f| f.agent_id)
            .await?;

        self.verify(wf, &config, 1).await?;
        Ok(config)
    }

    /// Mutate only the named subsystems; the agent and file are always touched
    pub async fn update(
        &self,
        current: &UnifiedConfiguration,
        update: &UnifiedConfigurationUpdate,
    ) -> Result<UnifiedConfiguration, CoordinationError> {
        let mut steps = Vec::new();
        if update.personality_changes().is_some() {
            steps.push((ServiceName::Personality, Operation::Update));
        }
        if update.role_changes().is_some() {
            steps.push((ServiceName::Role, Operation::Update));
        }
        steps.push((ServiceName::Agent, Operation::Update));
        steps.push((ServiceName::File, Operation::Update));

        let mut wf = WorkflowState::begin(
            Operation::Update,
            Some(current.agent_id()),
            PlannedStep::chain(&steps),
        );
        let outcome = self.update_steps(&mut wf, current, update).await;
        self.finish(wf, outcome).await
    }

    async fn update_steps(
        &self,
        wf: &mut WorkflowState,
        current: &UnifiedConfiguration,
        update: &UnifiedConfigurationUpdate,
    ) -> Result<UnifiedConfiguration, CoordinationError> {
        let s = &self.subsystems;

        let personality = match update.personality_changes() {
            Some(patch) => {
                self.run_step(
                    wf,
                    ServiceName::Personality,
                    s.personalities.update(current.personality.id, patch),
                    |p| p.id,
                )
                .await?
            }
            None => current.personality.clone(),
        };
        let role = match update.role_changes() {
            Some(patch) => {
                self.run_step(wf, ServiceName::Role, s.roles.update(current.role.id, patch), |r| r.id)
                    .await?
            }
            None => current.role.clone(),
        };

        let mut agent_patch = update.agent.clone().unwrap_or_default();
        if role.name != current.agent.role_name {
            agent_patch.role_name = Some(role.name.clone());
        }
        let agent = self
            .run_step(
                wf,
                ServiceName::Agent,
                s.agents.update(current.agent_id(), &agent_patch),
                |a| a.id,
            )
            .await?;

        let config = UnifiedConfiguration {
            personality,
            role,
            agent,
        };
        self.run_step(wf, ServiceName::File, s.files.write(&config), |f| f.agent_id)
            .await?;

        self.verify(wf, &config, current.version() + 1).await?;
        Ok(config)
    }

    /// Metadata-only transition; references are kept
    pub async fn archive(
        &self,
        current: &UnifiedConfiguration,
    ) -> Result<UnifiedConfiguration, CoordinationError> {
        let plan = PlannedStep::chain(&[
            (ServiceName::Agent, Operation::Archive),
            (ServiceName::File, Operation::Update),
        ]);
        let mut wf = WorkflowState::begin(Operation::Archive, Some(current.agent_id()), plan);
        let outcome = self.archive_steps(&mut wf, current).await;
        self.finish(wf, outcome).await
    }

    async fn archive_steps(
        &self,
        wf: &mut WorkflowState,
        current: &UnifiedConfiguration,
    ) -> Result<UnifiedConfiguration, CoordinationError> {
        let s = &self.subsystems;
        let agent: Agent = self
            .run_step(wf, ServiceName::Agent, s.agents.archive(current.agent_id()), |a| a.id)
            .await?;
        let config = UnifiedConfiguration {
            agent,
            ..current.clone()
        };
        self.run_step(wf, ServiceName::File, s.files.write(&config), |f| f.agent_id)
            .await?;

        self.verify(wf, &config, current.version() + 1).await?;
        Ok(config)
    }

    /// File -> Agent -> Role -> Personality, after the dependents check
    pub async fn delete(&self, current: &UnifiedConfiguration) -> Result<(), CoordinationError> {
        let dependents = self.active_dependents(current).await?;
        if !dependents.is_empty() {
            tracing::warn!(
                agent_id = %current.agent_id(),
                dependents = ?dependents,
                "Delete blocked by active dependents"
            );
            return Err(CoordinationError::DependencyViolation {
                agent_id: current.agent_id(),
                dependents,
            });
        }

        let plan = PlannedStep::chain(&[
            (ServiceName::File, Operation::Delete),
            (ServiceName::Agent, Operation::Delete),
            (ServiceName::Role, Operation::Delete),
            (ServiceName::Personality, Operation::Delete),
        ]);
        let mut wf = WorkflowState::begin(Operation::Delete, Some(current.agent_id()), plan);
        let outcome = self.delete_steps(&mut wf, current).await;
        self.finish(wf, outcome).await
    }

    async fn delete_steps(
        &self,
        wf: &mut WorkflowState,
        current: &UnifiedConfiguration,
    ) -> Result<(), CoordinationError> {
        let s = &self.subsystems;
        let agent_id = current.agent_id();
        let role_id = current.role.id;
        let personality_id = current.personality.id;

        self.run_step(wf, ServiceName::File, s.files.delete(agent_id), |_| agent_id)
            .await?;
        self.run_step(wf, ServiceName::Agent, s.agents.delete(agent_id), |_| agent_id)
            .await?;
        self.run_step(wf, ServiceName::Role, s.roles.delete(role_id), |_| role_id)
            .await?;
        self.run_step(
            wf,
            ServiceName::Personality,
            s.personalities.delete(personality_id),
            |_| personality_id,
        )
        .await?;
        Ok(())
    }

    async fn active_dependents(
        &self,
        current: &UnifiedConfiguration,
    ) -> Result<Vec<Dependent>, CoordinationError> {
        let s = &self.subsystems;
        let correlation = Uuid::new_v4();
        let (external, derived, sharing) = tokio::join!(
            self.read(
                ServiceName::Agent,
                correlation,
                s.dependents.active_dependents(current.agent_id())
            ),
            self.read(ServiceName::Role, correlation, s.roles.count_derived(current.role.id)),
            self.read(
                ServiceName::Agent,
                correlation,
                s.agents.count_by_personality(current.personality.id)
            ),
        );

        let mut dependents: Vec<Dependent> = external?.into_iter().filter(|d| d.count > 0).collect();
        let derived = derived?;
        if derived > 0 {
            dependents.push(Dependent::new(DependentKind::DerivedRoleTemplate, derived));
        }
        // The aggregate's own agent references the personality too
        let others = sharing?.saturating_sub(1);
        if others > 0 {
            dependents.push(Dependent::new(DependentKind::SharedPersonality, others));
        }
        Ok(dependents)
    }

    /// Re-run pending compensation of a workflow left in `failed`
    pub async fn recover(&self, entry: JournalEntry) -> Result<WorkflowState, CoordinationError> {
        let JournalEntry {
            mut workflow,
            failure,
        } = entry;
        if workflow.status != WorkflowStatus::Failed {
            return Ok(workflow);
        }

        tracing::info!(
            transaction_id = %workflow.transaction_id,
            pending = workflow.pending_compensation().len(),
            "Recovering failed workflow"
        );

        let original = failure.map(|error| match error {
            CoordinationError::Rollback { original, .. } => *original,
            other => other,
        });

        match self.compensate(&mut workflow).await {
            Ok(()) => {
                workflow.finish(WorkflowStatus::RolledBack);
                self.journal.record(JournalEntry {
                    workflow: workflow.clone(),
                    failure: original,
                });
                Ok(workflow)
            }
            Err(CompensationFailure { service, message }) => {
                let transaction_id = workflow.transaction_id;
                let error = match original {
                    Some(original) => CoordinationError::Rollback {
                        service,
                        transaction_id,
                        message,
                        original: Box::new(original),
                    },
                    None => CoordinationError::Communication {
                        context: FailureContext::new(service, Operation::Rollback, 0, transaction_id),
                        source: DomainError::ExternalService(message),
                    },
                };
                self.journal.record(JournalEntry {
                    workflow,
                    failure: Some(error.clone()),
                });
                Err(error)
            }
        }
    }

    // ============================================
    // Reads
    // ============================================

    pub async fn load(&self, agent_id: Uuid) -> Result<Option<UnifiedConfiguration>, CoordinationError> {
        let correlation = Uuid::new_v4();
        let agent = self
            .read(ServiceName::Agent, correlation, self.subsystems.agents.find_by_id(agent_id))
            .await?;
        match agent {
            Some(agent) => self.assemble(agent, correlation).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn list(&self) -> Result<Vec<UnifiedConfiguration>, CoordinationError> {
        let correlation = Uuid::new_v4();
        let agents = self
            .read(ServiceName::Agent, correlation, self.subsystems.agents.find_all())
            .await?;
        try_join_all(agents.into_iter().map(|agent| self.assemble(agent, correlation))).await
    }

    /// Resolve an agent's personality and role into the full aggregate
    async fn assemble(
        &self,
        agent: Agent,
        correlation: Uuid,
    ) -> Result<UnifiedConfiguration, CoordinationError> {
        let s = &self.subsystems;
        let (personality, role) = tokio::join!(
            self.read(
                ServiceName::Personality,
                correlation,
                s.personalities.find_by_id(agent.personality_id)
            ),
            self.read(ServiceName::Role, correlation, s.roles.find_by_id(agent.role_id)),
        );

        let dangling = |service: ServiceName, field: &str, id: Uuid| CoordinationError::Inconsistent {
            agent_id: agent.id,
            violations: vec![ConsistencyViolation {
                service,
                description: format!("agent {} reference resolves", field),
                detail: format!("{} {} does not exist", service, id),
            }],
        };

        let personality = personality?.ok_or_else(|| {
            dangling(ServiceName::Personality, "personality", agent.personality_id)
        })?;
        let role = role?.ok_or_else(|| dangling(ServiceName::Role, "role", agent.role_id))?;

        Ok(UnifiedConfiguration {
            personality,
            role,
            agent,
        })
    }

    /// Evaluate the consistency rules against the stored artifact
    pub async fn consistency_report(
        &self,
        config: &UnifiedConfiguration,
        min_version: u64,
        correlation: Uuid,
    ) -> Result<ConsistencyReport, CoordinationError> {
        let file = self
            .read(
                ServiceName::File,
                correlation,
                self.subsystems.files.read(config.agent_id()),
            )
            .await?;
        let services = self
            .consistency
            .observe(config, file.as_ref())
            .map_err(|source| CoordinationError::Communication {
                context: FailureContext::new(ServiceName::File, Operation::Read, 0, correlation),
                source,
            })?;
        Ok(self
            .consistency
            .check(&services, &self.consistency.rules_for(min_version)))
    }

    pub fn consistency(&self) -> &ConsistencyValidator {
        &self.consistency
    }

    // ============================================
    // Step machinery
    // ============================================

    fn emit(
        &self,
        wf: &WorkflowState,
        service: ServiceName,
        operation: Operation,
        phase: TracePhase,
        detail: Option<String>,
    ) {
        let event = TraceEvent::new(wf.transaction_id, service, operation, phase);
        let event = match detail {
            Some(detail) => event.with_detail(detail),
            None => event,
        };
        self.observer.record(&event);
    }

    /// Run one planned step through the service's circuit
    async fn run_step<T, Fut>(
        &self,
        wf: &mut WorkflowState,
        service: ServiceName,
        call: Fut,
        entity_id: impl FnOnce(&T) -> Uuid,
    ) -> Result<T, CoordinationError>
    where
        Fut: Future<Output = Result<T, DomainError>>,
    {
        let Some((step, operation)) = wf.start_step(service) else {
            return Err(CoordinationError::Communication {
                context: FailureContext::new(service, wf.operation, 0, wf.transaction_id),
                source: DomainError::Conflict(format!(
                    "{} step started before its dependencies completed",
                    service
                )),
            });
        };
        let context = FailureContext::new(service, operation, step, wf.transaction_id);
        self.emit(wf, service, operation, TracePhase::Started, None);

        match self
            .breakers
            .call(service, operation, self.budgets.step(), call)
            .await
        {
            Ok(value) => {
                wf.complete_step(service, entity_id(&value));
                self.emit(wf, service, operation, TracePhase::Succeeded, None);
                Ok(value)
            }
            Err(failure) => {
                let phase = match failure {
                    GuardFailure::Open { .. } => TracePhase::ShortCircuited,
                    GuardFailure::Failed(_) => TracePhase::Failed,
                };
                let involved: Vec<ServiceName> =
                    wf.completed.iter().chain(&wf.failed).copied().collect();
                let error = self.breakers.classify(context, failure, &involved);
                let message = error.to_string();
                let unreachable = wf.fail_step(service, &message);
                self.emit(wf, service, operation, phase, Some(message));
                for skipped in unreachable {
                    let skipped_op = wf.step(skipped).map_or(operation, |s| s.operation);
                    self.emit(wf, skipped, skipped_op, TracePhase::Skipped, None);
                }
                Err(error)
            }
        }
    }

    /// A guarded call outside any planned step
    async fn read<T>(
        &self,
        service: ServiceName,
        correlation: Uuid,
        call: impl Future<Output = Result<T, DomainError>>,
    ) -> Result<T, CoordinationError> {
        self.breakers
            .call(service, Operation::Read, self.budgets.step(), call)
            .await
            .map_err(|failure| {
                let context = FailureContext::new(service, Operation::Read, 0, correlation);
                self.breakers.classify(context, failure, &[])
            })
    }

    /// Final consistency check inside the unit of work
    async fn verify(
        &self,
        wf: &WorkflowState,
        config: &UnifiedConfiguration,
        min_version: u64,
    ) -> Result<(), CoordinationError> {
        let report = self
            .consistency_report(config, min_version, wf.transaction_id)
            .await?;
        if report.is_consistent {
            return Ok(());
        }

        let violations = report.violations;
        self.emit(
            wf,
            ServiceName::File,
            Operation::Validate,
            TracePhase::Failed,
            Some(format!("{} consistency violation(s)", violations.len())),
        );
        Err(CoordinationError::Inconsistent {
            agent_id: config.agent_id(),
            violations,
        })
    }

    /// Roll back completed steps in reverse order under the compensation budget
    async fn compensate(&self, wf: &mut WorkflowState) -> Result<(), CompensationFailure> {
        let budget = self.budgets.compensation();
        let deadline = Instant::now() + budget;

        for (service, entity_id) in wf.pending_compensation() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let outcome = match timeout(
                remaining.min(self.budgets.step()),
                self.subsystems.rollback(service, entity_id),
            )
            .await
            {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(_) => Err(format!(
                    "rollback did not finish within the {}ms compensation budget",
                    budget.as_millis()
                )),
            };

            match outcome {
                Ok(()) => {
                    wf.record_compensation(service, entity_id, Ok(()));
                    self.emit(wf, service, Operation::Rollback, TracePhase::Compensated, None);
                }
                Err(message) => {
                    wf.record_compensation(service, entity_id, Err(message.clone()));
                    self.emit(
                        wf,
                        service,
                        Operation::Rollback,
                        TracePhase::CompensationFailed,
                        Some(message.clone()),
                    );
                    return Err(CompensationFailure { service, message });
                }
            }
        }
        Ok(())
    }

    /// Close the workflow: compensate on failure, then journal it
    async fn finish<T>(
        &self,
        mut wf: WorkflowState,
        outcome: Result<T, CoordinationError>,
    ) -> Result<T, CoordinationError> {
        match outcome {
            Ok(value) => {
                // Nothing is left to compensate; completed steps are final
                for (service, entity_id) in wf.pending_compensation() {
                    self.subsystems.release(service, entity_id);
                }
                wf.finish(WorkflowStatus::Completed);
                tracing::info!(
                    transaction_id = %wf.transaction_id,
                    operation = %wf.operation,
                    agent_id = ?wf.agent_id,
                    elapsed_ms = wf.elapsed_ms(),
                    "Workflow completed"
                );
                self.journal.record(JournalEntry {
                    workflow: wf,
                    failure: None,
                });
                Ok(value)
            }
            Err(error) => {
                let error = match self.compensate(&mut wf).await {
                    Ok(()) => {
                        wf.finish(WorkflowStatus::RolledBack);
                        error
                    }
                    Err(CompensationFailure { service, message }) => {
                        wf.finish(WorkflowStatus::Failed);
                        CoordinationError::Rollback {
                            service,
                            transaction_id: wf.transaction_id,
                            message,
                            original: Box::new(error),
                        }
                    }
                };
                tracing::warn!(
                    transaction_id = %wf.transaction_id,
                    operation = %wf.operation,
                    status = ?wf.status,
                    compensated = wf.compensations.iter().filter(|c| c.succeeded).count(),
                    error = %error,
                    "Workflow failed"
                );
                self.journal.record(JournalEntry {
                    workflow: wf,
                    failure: Some(error.clone()),
                });
                Err(error)
            }
        }
    }
}
