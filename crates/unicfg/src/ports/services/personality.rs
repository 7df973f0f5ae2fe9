//! Personality Service Port

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    errors::DomainError, PersonalityConfiguration, PersonalityDraft, PersonalityPatch,
    ValidationResult,
};

/// Personality subsystem interface
#[async_trait]
pub trait PersonalityService: Send + Sync {
    /// Create a personality from a draft
    async fn create(&self, draft: &PersonalityDraft)
        -> Result<PersonalityConfiguration, DomainError>;

    /// Find a personality by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<PersonalityConfiguration>, DomainError>;

    /// Apply a partial update
    async fn update(
        &self,
        id: Uuid,
        patch: &PersonalityPatch,
    ) -> Result<PersonalityConfiguration, DomainError>;

    /// Delete a personality
    async fn delete(&self, id: Uuid) -> Result<(), DomainError>;

    /// Entity-level validation (required fields, trait ranges)
    async fn validate_entity(&self, draft: &PersonalityDraft)
        -> Result<ValidationResult, DomainError>;

    /// Undo the most recent mutation of `id`
    ///
    /// Must be idempotent: rolling back an id with nothing to undo succeeds.
    async fn rollback(&self, id: Uuid) -> Result<(), DomainError>;

    /// Drop the undo state kept for `id`; its last mutation is final
    fn release(&self, _id: Uuid) {}
}
