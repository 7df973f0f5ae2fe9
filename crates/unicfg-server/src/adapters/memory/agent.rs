//! In-memory implementation of AgentService

use async_trait::async_trait;
use uuid::Uuid;

use unicfg::{
    Agent, AgentDraft, AgentLinks, AgentPatch, AgentService, DomainError, Operation, ServiceName,
    ValidationIssue, ValidationResult,
};

use super::{FaultPlan, MemoryStore};

const SERVICE: ServiceName = ServiceName::Agent;

/// Keys in `settings.extra` that must never hold a literal value
const SECRET_MARKERS: [&str; 4] = ["api_key", "password", "secret", "token"];

const MAX_TOKENS_LIMIT: u32 = 200_000;

pub struct InMemoryAgentService {
    store: MemoryStore<Agent>,
    faults: FaultPlan,
}

impl InMemoryAgentService {
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            faults: FaultPlan::new(),
        }
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryAgentService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentService for InMemoryAgentService {
    async fn create(&self, draft: &AgentDraft, links: &AgentLinks) -> Result<Agent, DomainError> {
        self.faults.enact(SERVICE, Operation::Create).await?;
        let agent = Agent::new(draft, links);
        self.store.insert(agent.id, agent.clone());
        Ok(agent)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Agent>, DomainError> {
        self.faults.enact(SERVICE, Operation::Read).await?;
        Ok(self.store.get(id))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Agent>, DomainError> {
        self.faults.enact(SERVICE, Operation::Read).await?;
        Ok(self.store.all().into_iter().find(|a| a.name == name))
    }

    async fn find_all(&self) -> Result<Vec<Agent>, DomainError> {
        self.faults.enact(SERVICE, Operation::Read).await?;
        let mut agents = self.store.all();
        agents.sort_by_key(|a| std::cmp::Reverse(a.metadata.created_at));
        Ok(agents)
    }

    async fn update(&self, id: Uuid, patch: &AgentPatch) -> Result<Agent, DomainError> {
        self.faults.enact(SERVICE, Operation::Update).await?;
        self.store
            .replace(id, |current| current.apply(patch))
            .ok_or_else(|| DomainError::not_found("Agent", id))
    }

    async fn archive(&self, id: Uuid) -> Result<Agent, DomainError> {
        self.faults.enact(SERVICE, Operation::Archive).await?;
        self.store
            .replace(id, Agent::archived)
            .ok_or_else(|| DomainError::not_found("Agent", id))
    }

    async fn delete(&self, id: Uuid) -> Result<(), DomainError> {
        self.faults.enact(SERVICE, Operation::Delete).await?;
        self.store
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| DomainError::not_found("Agent", id))
    }

    async fn validate_entity(&self, draft: &AgentDraft) -> Result<ValidationResult, DomainError> {
        self.faults.enact(SERVICE, Operation::Validate).await?;

        let mut errors = Vec::new();
        if draft.name.trim().is_empty() {
            errors.push(ValidationIssue::new(
                "agent.name",
                "REQUIRED",
                "agent name is required",
            ));
        }
        if draft.model.trim().is_empty() {
            errors.push(ValidationIssue::new(
                "agent.model",
                "REQUIRED",
                "agent model is required",
            ));
        }

        let settings = &draft.settings;
        if !(0.0..=2.0).contains(&settings.temperature) {
            errors.push(ValidationIssue::new(
                "agent.settings.temperature",
                "OUT_OF_RANGE",
                format!(
                    "temperature {} is out of range; use a value between 0.0 and 2.0",
                    settings.temperature
                ),
            ));
        }
        if settings.max_tokens == 0 || settings.max_tokens > MAX_TOKENS_LIMIT {
            errors.push(ValidationIssue::new(
                "agent.settings.max_tokens",
                "OUT_OF_RANGE",
                format!(
                    "max_tokens {} is out of range; use 1 to {}",
                    settings.max_tokens, MAX_TOKENS_LIMIT
                ),
            ));
        }
        Ok(ValidationResult::from_errors(errors))
    }

    async fn validate_security(&self, draft: &AgentDraft) -> Result<ValidationResult, DomainError> {
        self.faults.enact(SERVICE, Operation::Validate).await?;

        let errors = draft
            .settings
            .extra
            .iter()
            .filter(|(key, value)| {
                let key = key.to_lowercase();
                value.is_string() && SECRET_MARKERS.iter().any(|m| key.contains(m))
            })
            .map(|(key, _)| {
                ValidationIssue::new(
                    format!("agent.settings.extra.{}", key),
                    "PLAINTEXT_SECRET",
                    format!(
                        "'{}' holds a literal secret; store a secret reference instead",
                        key
                    ),
                )
            })
            .collect();
        Ok(ValidationResult::from_errors(errors))
    }

    async fn count_by_personality(&self, personality_id: Uuid) -> Result<usize, DomainError> {
        self.faults.enact(SERVICE, Operation::Read).await?;
        Ok(self
            .store
            .all()
            .iter()
            .filter(|a| a.personality_id == personality_id)
            .count())
    }

    async fn rollback(&self, id: Uuid) -> Result<(), DomainError> {
        self.faults.enact(SERVICE, Operation::Rollback).await?;
        if self.store.rollback(id) {
            tracing::debug!(agent_id = %id, "Agent rolled back");
        }
        Ok(())
    }

    fn release(&self, id: Uuid) {
        self.store.release(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unicfg::AgentSettings;

    fn links() -> AgentLinks {
        AgentLinks {
            personality_id: Uuid::new_v4(),
            role_id: Uuid::new_v4(),
            role_name: "triage".to_string(),
        }
    }

    #[tokio::test]
    async fn test_archive_is_metadata_only() {
        let service = InMemoryAgentService::new();
        let links = links();
        let agent = service
            .create(&AgentDraft::new("atlas", "gpt-4o"), &links)
            .await
            .unwrap();

        let archived = service.archive(agent.id).await.unwrap();

        assert!(archived.is_archived());
        assert!(!archived.metadata.is_active);
        assert_eq!(archived.metadata.version, 2);
        assert_eq!(archived.personality_id, links.personality_id);
        assert_eq!(archived.role_id, links.role_id);
    }

    #[tokio::test]
    async fn test_settings_ranges_are_validated() {
        let service = InMemoryAgentService::new();
        let draft = AgentDraft::new("atlas", "").with_settings(AgentSettings {
            temperature: 3.5,
            max_tokens: 0,
            ..Default::default()
        });

        let result = service.validate_entity(&draft).await.unwrap();
        assert_eq!(result.codes(), vec!["REQUIRED", "OUT_OF_RANGE", "OUT_OF_RANGE"]);
    }

    #[tokio::test]
    async fn test_literal_secret_is_flagged() {
        let service = InMemoryAgentService::new();
        let mut settings = AgentSettings::default();
        settings
            .extra
            .insert("OPENAI_API_KEY".to_string(), serde_json::json!("sk-live"));
        settings
            .extra
            .insert("retry_budget".to_string(), serde_json::json!(3));
        let draft = AgentDraft::new("atlas", "gpt-4o").with_settings(settings);

        let result = service.validate_security(&draft).await.unwrap();
        assert_eq!(result.codes(), vec!["PLAINTEXT_SECRET"]);
    }

    #[tokio::test]
    async fn test_count_by_personality() {
        let service = InMemoryAgentService::new();
        let shared = links();
        service
            .create(&AgentDraft::new("atlas", "gpt-4o"), &shared)
            .await
            .unwrap();
        service
            .create(&AgentDraft::new("boreas", "gpt-4o"), &shared)
            .await
            .unwrap();

        assert_eq!(
            service.count_by_personality(shared.personality_id).await.unwrap(),
            2
        );
    }
}
