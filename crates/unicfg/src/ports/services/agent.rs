//! Agent Service Port

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    errors::DomainError, Agent, AgentDraft, AgentLinks, AgentPatch, ValidationResult,
};

/// Agent subsystem interface
#[async_trait]
pub trait AgentService: Send + Sync {
    /// Create an agent linked to an existing personality and role
    async fn create(&self, draft: &AgentDraft, links: &AgentLinks) -> Result<Agent, DomainError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Agent>, DomainError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<Agent>, DomainError>;

    async fn find_all(&self) -> Result<Vec<Agent>, DomainError>;

    /// Apply a partial update; bumps the agent version even for an empty patch
    async fn update(&self, id: Uuid, patch: &AgentPatch) -> Result<Agent, DomainError>;

    /// Mark the agent archived (metadata only)
    async fn archive(&self, id: Uuid) -> Result<Agent, DomainError>;

    async fn delete(&self, id: Uuid) -> Result<(), DomainError>;

    async fn validate_entity(&self, draft: &AgentDraft) -> Result<ValidationResult, DomainError>;

    /// Agent-specific security checks (settings, model access)
    async fn validate_security(&self, draft: &AgentDraft)
        -> Result<ValidationResult, DomainError>;

    /// Number of agents referencing personality `personality_id`
    async fn count_by_personality(&self, personality_id: Uuid) -> Result<usize, DomainError>;

    /// Undo the most recent mutation of `id` (idempotent)
    async fn rollback(&self, id: Uuid) -> Result<(), DomainError>;

    /// Drop the undo state kept for `id`; its last mutation is final
    fn release(&self, _id: Uuid) {}
}
