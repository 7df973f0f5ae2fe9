//! Configuration File Service Port
//!
//! Renders a unified configuration into a persisted artifact keyed by agent id.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    errors::DomainError, AgentDraft, ConfigurationFile, UnifiedConfiguration, ValidationResult,
};

#[async_trait]
pub trait ConfigurationFileService: Send + Sync {
    /// Write (or overwrite) the artifact for `config`
    async fn write(&self, config: &UnifiedConfiguration) -> Result<ConfigurationFile, DomainError>;

    async fn read(&self, agent_id: Uuid) -> Result<Option<ConfigurationFile>, DomainError>;

    async fn delete(&self, agent_id: Uuid) -> Result<(), DomainError>;

    /// Check the agent can be rendered (file name constraints)
    async fn validate_entity(&self, draft: &AgentDraft) -> Result<ValidationResult, DomainError>;

    /// Restore the artifact as it was before the most recent write/delete (idempotent)
    async fn rollback(&self, agent_id: Uuid) -> Result<(), DomainError>;

    /// Drop the pre-image kept for `agent_id`
    fn release(&self, _agent_id: Uuid) {}
}
