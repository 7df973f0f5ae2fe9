//! Unified Configuration Application Service (Use Case)
//!
//! Entry point for callers. Validates before any mutation, serializes
//! mutations per aggregate and delegates units of work to the
//! `TransactionCoordinator`. An aggregate whose last workflow is left in
//! `failed` accepts no mutation until it is recovered.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tokio::time::Instant;
use uuid::Uuid;

use unicfg::{
    ConsistencyReport, CoordinationError, TraceObserver, UnifiedConfiguration,
    UnifiedConfigurationRequest, UnifiedConfigurationUpdate, ValidationResult, WorkflowState,
};

use super::config::{CoordinatorConfig, TimingBudgets};
use super::conflict::{ConflictResolver, ResolvedChange};
use super::consistency::ConsistencyOutcome;
use super::journal::{JournalEntry, WorkflowJournal};
use super::resilience::{CircuitBreakerRegistry, CircuitStats};
use super::subsystems::Subsystems;
use super::transaction::TransactionCoordinator;
use super::validation::ValidationAggregator;

/// Application service for unified configuration operations
pub struct UnifiedConfigurationService {
    validator: ValidationAggregator,
    coordinator: TransactionCoordinator,
    conflicts: ConflictResolver,
    breakers: Arc<CircuitBreakerRegistry>,
    journal: Arc<WorkflowJournal>,
    budgets: TimingBudgets,
}

impl UnifiedConfigurationService {
    pub fn new(
        subsystems: Subsystems,
        observer: Arc<dyn TraceObserver>,
        config: CoordinatorConfig,
    ) -> Self {
        let breakers = Arc::new(CircuitBreakerRegistry::new(config.circuit.clone()));
        let journal = Arc::new(WorkflowJournal::new(config.journal_capacity));

        Self {
            validator: ValidationAggregator::new(
                subsystems.clone(),
                breakers.clone(),
                config.validation.clone(),
                config.budgets.clone(),
            ),
            coordinator: TransactionCoordinator::new(
                subsystems,
                breakers.clone(),
                observer,
                journal.clone(),
                config.budgets.clone(),
            ),
            conflicts: ConflictResolver::new(
                config.conflict_strategy,
                config.strict_versioning,
                config.history_capacity,
            ),
            breakers,
            journal,
            budgets: config.budgets,
        }
    }

    /// Validate, then create all four parts as one unit of work
    pub async fn create_unified_configuration(
        &self,
        request: &UnifiedConfigurationRequest,
    ) -> Result<UnifiedConfiguration, CoordinationError> {
        let started = Instant::now();

        let _name = self.conflicts.lock_name(&request.agent.name).await;
        let validation = self.validator.validate(request, None).await?;
        if !validation.is_valid {
            tracing::info!(
                agent = %request.agent.name,
                errors = validation.errors.len(),
                "Rejected configuration at validation"
            );
            return Err(CoordinationError::Validation(validation));
        }

        let config = self.coordinator.create(request).await?;

        let elapsed = started.elapsed();
        if elapsed > self.budgets.create_warn() {
            tracing::warn!(
                agent_id = %config.agent_id(),
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = self.budgets.create_warn_ms,
                "Create exceeded its budget"
            );
        }
        tracing::info!(
            "Created unified configuration: {} ({})",
            config.agent.name,
            config.agent_id()
        );
        Ok(config)
    }

    /// Each request is its own unit of work; results keep request order
    pub async fn create_many(
        &self,
        requests: &[UnifiedConfigurationRequest],
    ) -> Vec<Result<UnifiedConfiguration, CoordinationError>> {
        join_all(
            requests
                .iter()
                .map(|request| self.create_unified_configuration(request)),
        )
        .await
    }

    pub async fn get_unified_configuration(
        &self,
        agent_id: Uuid,
    ) -> Result<Option<UnifiedConfiguration>, CoordinationError> {
        self.coordinator.load(agent_id).await
    }

    pub async fn list_unified_configurations(
        &self,
    ) -> Result<Vec<UnifiedConfiguration>, CoordinationError> {
        self.coordinator.list().await
    }

    /// Apply a partial update, resolving stale `expected_version`s
    pub async fn update_unified_configuration(
        &self,
        agent_id: Uuid,
        update: UnifiedConfigurationUpdate,
    ) -> Result<UnifiedConfiguration, CoordinationError> {
        let _guard = self.conflicts.lock(agent_id).await;
        let current = self.load_existing(agent_id).await?;
        if update.is_empty() {
            return Ok(current);
        }
        self.ensure_recovered(agent_id)?;

        let timestamp = update.timestamp.unwrap_or_else(Utc::now);
        let effective =
            match self
                .conflicts
                .reconcile(agent_id, current.version(), &update, timestamp)?
            {
                ResolvedChange::Apply(effective) => effective,
                ResolvedChange::Discard => {
                    tracing::info!(
                        agent_id = %agent_id,
                        version = current.version(),
                        "Incoming update lost conflict resolution; keeping current"
                    );
                    return Ok(current);
                }
            };

        let rename = effective
            .agent
            .as_ref()
            .and_then(|patch| patch.name.as_deref())
            .filter(|name| *name != current.agent.name);
        let _name = match rename {
            Some(name) => Some(self.conflicts.lock_name(name).await),
            None => None,
        };

        let prospective = current.to_request().patched(&effective);
        let validation = self.validator.validate(&prospective, Some(agent_id)).await?;
        if !validation.is_valid {
            return Err(CoordinationError::Validation(validation));
        }

        let updated = self.coordinator.update(&current, &effective).await?;
        self.conflicts
            .record_applied(agent_id, updated.version(), timestamp, effective);

        tracing::info!(
            agent_id = %agent_id,
            version = updated.version(),
            "Updated unified configuration"
        );
        Ok(updated)
    }

    pub async fn delete_unified_configuration(&self, agent_id: Uuid) -> Result<(), CoordinationError> {
        let _guard = self.conflicts.lock(agent_id).await;
        let current = self.load_existing(agent_id).await?;
        self.ensure_recovered(agent_id)?;

        self.coordinator.delete(&current).await?;
        self.conflicts.forget(agent_id);

        tracing::info!("Deleted unified configuration: {}", agent_id);
        Ok(())
    }

    /// Deactivate without removing anything; archiving twice is a no-op
    pub async fn archive_unified_configuration(
        &self,
        agent_id: Uuid,
    ) -> Result<UnifiedConfiguration, CoordinationError> {
        let _guard = self.conflicts.lock(agent_id).await;
        let current = self.load_existing(agent_id).await?;
        if current.agent.is_archived() {
            return Ok(current);
        }
        self.ensure_recovered(agent_id)?;

        let archived = self.coordinator.archive(&current).await?;
        self.conflicts.record_applied(
            agent_id,
            archived.version(),
            Utc::now(),
            UnifiedConfigurationUpdate::default(),
        );

        tracing::info!(
            agent_id = %agent_id,
            version = archived.version(),
            "Archived unified configuration"
        );
        Ok(archived)
    }

    pub async fn validate_unified_configuration(
        &self,
        request: &UnifiedConfigurationRequest,
    ) -> Result<ValidationResult, CoordinationError> {
        self.validator.validate(request, None).await
    }

    /// Re-run pending compensation for a failed workflow.
    ///
    /// Without a transaction id the most recent failed workflow is used.
    /// Returns `None` when there is nothing to recover.
    pub async fn rollback_configuration(
        &self,
        transaction_id: Option<Uuid>,
    ) -> Result<Option<WorkflowState>, CoordinationError> {
        let entry = match transaction_id {
            Some(id) => Some(
                self.journal
                    .get(id)
                    .ok_or(CoordinationError::WorkflowNotFound(id))?,
            ),
            None => self.journal.latest_failed(),
        };
        let Some(entry) = entry else {
            return Ok(None);
        };

        let _guard = match entry.workflow.agent_id {
            Some(agent_id) => Some(self.conflicts.lock(agent_id).await),
            None => None,
        };
        self.coordinator.recover(entry).await.map(Some)
    }

    /// Immediate consistency check of the stored aggregate
    pub async fn verify_consistency(&self, agent_id: Uuid) -> Result<ConsistencyReport, CoordinationError> {
        let current = self.load_existing(agent_id).await?;
        self.coordinator
            .consistency_report(&current, current.version(), Uuid::new_v4())
            .await
    }

    /// Poll until consistent or the consistency window elapses
    pub async fn await_consistency(&self, agent_id: Uuid) -> Result<ConsistencyOutcome, CoordinationError> {
        self.coordinator
            .consistency()
            .await_consistent(
                self.budgets.consistency_window(),
                self.budgets.consistency_poll(),
                || self.verify_consistency(agent_id),
            )
            .await
    }

    /// Newest first
    pub fn recent_workflows(&self, limit: usize) -> Vec<JournalEntry> {
        self.journal.recent(limit)
    }

    pub fn circuit_stats(&self) -> Vec<CircuitStats> {
        self.breakers.stats()
    }

    /// Refuse to mutate an aggregate with compensation still pending
    fn ensure_recovered(&self, agent_id: Uuid) -> Result<(), CoordinationError> {
        match self.journal.pending_for(agent_id) {
            Some(entry) => {
                let transaction_id = entry.workflow.transaction_id;
                tracing::warn!(
                    agent_id = %agent_id,
                    transaction_id = %transaction_id,
                    "Mutation refused until the failed workflow is recovered"
                );
                Err(CoordinationError::RecoveryPending {
                    agent_id,
                    transaction_id,
                })
            }
            None => Ok(()),
        }
    }

    async fn load_existing(&self, agent_id: Uuid) -> Result<UnifiedConfiguration, CoordinationError> {
        self.coordinator
            .load(agent_id)
            .await?
            .ok_or(CoordinationError::NotFound(agent_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::observer::RecordingObserver;
    use crate::adapters::LocalSubsystems;
    use std::collections::HashSet;
    use tempfile::TempDir;
    use unicfg::{
        AgentDraft, AgentPatch, Behavior, ConflictStrategy, Dependent, DependentKind, Operation,
        PersonalityDraft, PersonalityPatch, RoleDraft, RolePatch, ServiceName, WorkflowStatus,
    };

    struct Harness {
        _dir: TempDir,
        stack: LocalSubsystems,
        service: UnifiedConfigurationService,
    }

    fn harness_with(config: CoordinatorConfig) -> Harness {
        let dir = TempDir::new().unwrap();
        let stack = LocalSubsystems::new(dir.path());
        let service = UnifiedConfigurationService::new(
            stack.subsystems(),
            Arc::new(RecordingObserver::new()),
            config,
        );
        Harness {
            _dir: dir,
            stack,
            service,
        }
    }

    fn harness() -> Harness {
        harness_with(CoordinatorConfig::default())
    }

    fn request(name: &str) -> UnifiedConfigurationRequest {
        UnifiedConfigurationRequest::new(
            PersonalityDraft::new("Patient").with_trait("empathy", 0.8),
            RoleDraft::new(format!("{} support", name)).with_capability("customer_support"),
            AgentDraft::new(name, "gpt-4o"),
        )
    }

    fn model_update(model: &str) -> UnifiedConfigurationUpdate {
        UnifiedConfigurationUpdate {
            agent: Some(AgentPatch {
                model: Some(model.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_then_get_is_idempotent() {
        let h = harness();
        let created = h
            .service
            .create_unified_configuration(&request("atlas"))
            .await
            .unwrap();

        let first = h.service.get_unified_configuration(created.agent_id()).await.unwrap();
        let second = h.service.get_unified_configuration(created.agent_id()).await.unwrap();
        assert_eq!(first, Some(created.clone()));
        assert_eq!(first, second);
        assert_eq!(created.version(), 1);
    }

    #[tokio::test]
    async fn test_role_failure_leaves_nothing_behind() {
        let h = harness();
        h.stack
            .roles
            .faults()
            .set(Operation::Create, Behavior::fail_with("role store offline"));

        let err = h
            .service
            .create_unified_configuration(&request("atlas"))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Role"));
        assert_eq!(h.stack.personalities.faults().calls(Operation::Rollback), 1);
        assert!(h.service.list_unified_configurations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_request_makes_no_mutating_call() {
        let h = harness();
        let mut invalid = request("atlas");
        invalid.agent.settings.temperature = 5.0;

        let err = h
            .service
            .create_unified_configuration(&invalid)
            .await
            .unwrap_err();

        let CoordinationError::Validation(result) = err else {
            panic!("expected validation error");
        };
        assert!(!result.is_valid);
        assert_eq!(h.stack.personalities.faults().calls(Operation::Create), 0);
        assert_eq!(h.stack.agents.faults().calls(Operation::Create), 0);
    }

    #[tokio::test]
    async fn test_concurrent_creates_do_not_mix() {
        let h = harness();
        let requests = vec![request("atlas"), request("boreas"), request("cygnus")];

        let results = h.service.create_many(&requests).await;

        let configs: Vec<UnifiedConfiguration> = results.into_iter().map(|r| r.unwrap()).collect();
        let ids: HashSet<Uuid> = configs.iter().map(|c| c.agent_id()).collect();
        assert_eq!(ids.len(), 3);
        for (config, request) in configs.iter().zip(&requests) {
            assert_eq!(config.agent.name, request.agent.name);
            assert_eq!(config.role.name, request.role.name);
            assert_eq!(config.agent.role_id, config.role.id);
        }
    }

    #[tokio::test]
    async fn test_update_bumps_version_once() {
        let h = harness();
        let created = h
            .service
            .create_unified_configuration(&request("atlas"))
            .await
            .unwrap();

        let updated = h
            .service
            .update_unified_configuration(created.agent_id(), model_update("claude-3-opus"))
            .await
            .unwrap();

        assert_eq!(updated.version(), created.version() + 1);
        assert_eq!(updated.agent.model, "claude-3-opus");
        let report = h.service.verify_consistency(created.agent_id()).await.unwrap();
        assert!(report.is_consistent, "{:?}", report.violations);
    }

    #[tokio::test]
    async fn test_empty_update_is_a_no_op() {
        let h = harness();
        let created = h
            .service
            .create_unified_configuration(&request("atlas"))
            .await
            .unwrap();

        let same = h
            .service
            .update_unified_configuration(created.agent_id(), UnifiedConfigurationUpdate::default())
            .await
            .unwrap();
        assert_eq!(same, created);
    }

    #[tokio::test]
    async fn test_stale_update_loses_under_last_write_wins() {
        let h = harness();
        let created = h
            .service
            .create_unified_configuration(&request("atlas"))
            .await
            .unwrap();
        let read_at = Utc::now();

        let first = h
            .service
            .update_unified_configuration(
                created.agent_id(),
                model_update("gemini-pro").with_timestamp(read_at + chrono::Duration::seconds(5)),
            )
            .await
            .unwrap();

        let stale = model_update("claude-3-opus")
            .with_expected_version(created.version())
            .with_timestamp(read_at);
        let outcome = h
            .service
            .update_unified_configuration(created.agent_id(), stale)
            .await
            .unwrap();

        assert_eq!(outcome, first);
        assert_eq!(outcome.agent.model, "gemini-pro");
    }

    #[tokio::test]
    async fn test_strict_versioning_rejects_stale_update() {
        let h = harness_with(CoordinatorConfig::default().with_strict_versioning(true));
        let created = h
            .service
            .create_unified_configuration(&request("atlas"))
            .await
            .unwrap();
        h.service
            .update_unified_configuration(created.agent_id(), model_update("gemini-pro"))
            .await
            .unwrap();

        let err = h
            .service
            .update_unified_configuration(
                created.agent_id(),
                model_update("claude-3-opus").with_expected_version(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinationError::VersionConflict {
                expected: 1,
                observed: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_merge_keeps_non_overlapping_fields() {
        let h = harness_with(
            CoordinatorConfig::default().with_conflict_strategy(ConflictStrategy::Merge),
        );
        let created = h
            .service
            .create_unified_configuration(&request("atlas"))
            .await
            .unwrap();
        h.service
            .update_unified_configuration(created.agent_id(), model_update("gemini-pro"))
            .await
            .unwrap();

        let rename = UnifiedConfigurationUpdate {
            personality: Some(PersonalityPatch {
                name: Some("Curious".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
        .with_expected_version(1);
        let merged = h
            .service
            .update_unified_configuration(created.agent_id(), rename)
            .await
            .unwrap();

        assert_eq!(merged.personality.name, "Curious");
        assert_eq!(merged.agent.model, "gemini-pro");
        assert_eq!(merged.version(), 3);
    }

    #[tokio::test]
    async fn test_update_of_missing_aggregate_is_not_found() {
        let h = harness();
        let missing = Uuid::new_v4();
        let err = h
            .service
            .update_unified_configuration(missing, model_update("gpt-4o"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinationError::NotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn test_archive_twice_bumps_version_once() {
        let h = harness();
        let created = h
            .service
            .create_unified_configuration(&request("atlas"))
            .await
            .unwrap();

        let archived = h
            .service
            .archive_unified_configuration(created.agent_id())
            .await
            .unwrap();
        let again = h
            .service
            .archive_unified_configuration(created.agent_id())
            .await
            .unwrap();

        assert!(!archived.agent.metadata.is_active);
        assert_eq!(again.version(), created.version() + 1);
    }

    #[tokio::test]
    async fn test_delete_blocked_by_shared_personality() {
        let h = harness();
        let created = h
            .service
            .create_unified_configuration(&request("atlas"))
            .await
            .unwrap();
        h.stack.dependents.set(
            created.agent_id(),
            vec![Dependent::new(DependentKind::ScheduledTask, 2)],
        );

        let err = h
            .service
            .delete_unified_configuration(created.agent_id())
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinationError::DependencyViolation { .. }));

        h.stack.dependents.clear(created.agent_id());
        h.service
            .delete_unified_configuration(created.agent_id())
            .await
            .unwrap();
        assert!(h
            .service
            .get_unified_configuration(created.agent_id())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_open_circuit_fails_fast_without_calling_adapter() {
        let h = harness_with(CoordinatorConfig::default().with_circuit(3, 60_000));
        h.stack
            .roles
            .faults()
            .set(Operation::Validate, Behavior::fail_with("role store offline"));
        for name in ["a1", "a2", "a3"] {
            let err = h
                .service
                .create_unified_configuration(&request(name))
                .await
                .unwrap_err();
            assert!(matches!(err, CoordinationError::Communication { .. }));
        }
        let attempts = h.stack.roles.faults().calls(Operation::Validate);

        let err = h
            .service
            .create_unified_configuration(&request("a4"))
            .await
            .unwrap_err();

        assert!(matches!(err, CoordinationError::CircuitOpen { .. }));
        assert_eq!(h.stack.roles.faults().calls(Operation::Validate), attempts);
        assert_eq!(h.stack.personalities.faults().calls(Operation::Create), 0);
        let role_stats = h
            .service
            .circuit_stats()
            .into_iter()
            .find(|s| s.service == ServiceName::Role)
            .unwrap();
        assert!(role_stats.rejected_calls >= 1);
    }

    #[tokio::test]
    async fn test_rollback_configuration_recovers_latest_failure() {
        let h = harness();
        h.stack
            .agents
            .faults()
            .set(Operation::Create, Behavior::fail_with("agent store offline"));
        h.stack
            .personalities
            .faults()
            .set(Operation::Rollback, Behavior::fail_with("personality store locked"));
        let err = h
            .service
            .create_unified_configuration(&request("atlas"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinationError::Rollback { .. }));

        h.stack.personalities.faults().clear();
        let recovered = h.service.rollback_configuration(None).await.unwrap().unwrap();

        assert_eq!(recovered.status, WorkflowStatus::RolledBack);
        assert!(h.stack.personalities.is_empty());
        assert!(h.service.rollback_configuration(None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rollback_configuration_unknown_transaction() {
        let h = harness();
        let err = h
            .service
            .rollback_configuration(Some(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinationError::WorkflowNotFound(_)));
    }

    #[tokio::test]
    async fn test_await_consistency_for_stored_aggregate() {
        let h = harness();
        let created = h
            .service
            .create_unified_configuration(&request("atlas"))
            .await
            .unwrap();

        let outcome = h.service.await_consistency(created.agent_id()).await.unwrap();
        assert!(matches!(outcome, ConsistencyOutcome::Consistent(_)));
        assert_eq!(h.service.recent_workflows(10).len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_creates_cannot_share_a_name() {
        let h = harness();
        h.stack
            .agents
            .faults()
            .set(Operation::Create, Behavior::delay_then(20, Behavior::Succeed));

        let results = h
            .service
            .create_many(&[request("atlas"), request("atlas")])
            .await;

        let rejected: Vec<&CoordinationError> =
            results.iter().filter_map(|r| r.as_ref().err()).collect();
        assert_eq!(rejected.len(), 1);
        let CoordinationError::Validation(result) = rejected[0] else {
            panic!("expected validation error, got {}", rejected[0]);
        };
        assert!(result.codes().contains(&"AGENT_NAME_TAKEN"));
        assert_eq!(h.service.list_unified_configurations().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pending_rollback_blocks_mutations_until_recovered() {
        let h = harness();
        let created = h
            .service
            .create_unified_configuration(&request("atlas"))
            .await
            .unwrap();
        let agent_id = created.agent_id();
        let rename = |name: &str| UnifiedConfigurationUpdate {
            role: Some(RolePatch {
                name: Some(name.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        h.stack
            .files
            .faults()
            .set(Operation::Update, Behavior::fail_with("disk full"));
        h.stack
            .roles
            .faults()
            .set(Operation::Rollback, Behavior::fail_with("role store locked"));
        let err = h
            .service
            .update_unified_configuration(agent_id, rename("broken"))
            .await
            .unwrap_err();
        let failed_tx = err.transaction_id().unwrap();
        assert!(matches!(err, CoordinationError::Rollback { .. }));
        h.stack.files.faults().clear();
        h.stack.roles.faults().clear();

        let err = h
            .service
            .update_unified_configuration(agent_id, rename("lead"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinationError::RecoveryPending { transaction_id, .. } if transaction_id == failed_tx
        ));
        assert!(matches!(
            h.service.archive_unified_configuration(agent_id).await,
            Err(CoordinationError::RecoveryPending { .. })
        ));
        assert!(matches!(
            h.service.delete_unified_configuration(agent_id).await,
            Err(CoordinationError::RecoveryPending { .. })
        ));

        let recovered = h.service.rollback_configuration(None).await.unwrap().unwrap();
        assert_eq!(recovered.transaction_id, failed_tx);
        assert_eq!(recovered.status, WorkflowStatus::RolledBack);
        let restored = h.service.get_unified_configuration(agent_id).await.unwrap().unwrap();
        assert_eq!(restored, created);

        let updated = h
            .service
            .update_unified_configuration(agent_id, rename("lead"))
            .await
            .unwrap();
        assert_eq!(updated.role.name, "lead");
        assert_eq!(updated.agent.role_name, "lead");
        assert_eq!(updated.version(), created.version() + 1);
        let report = h.service.verify_consistency(agent_id).await.unwrap();
        assert!(report.is_consistent, "{:?}", report.violations);
    }
}
