//! Role Service Port

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{errors::DomainError, CustomRole, RoleDraft, RolePatch, ValidationResult};

/// Role subsystem interface
#[async_trait]
pub trait RoleService: Send + Sync {
    async fn create(&self, draft: &RoleDraft) -> Result<CustomRole, DomainError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CustomRole>, DomainError>;

    async fn update(&self, id: Uuid, patch: &RolePatch) -> Result<CustomRole, DomainError>;

    async fn delete(&self, id: Uuid) -> Result<(), DomainError>;

    /// Entity-level validation (required fields, duplicates)
    async fn validate_entity(&self, draft: &RoleDraft) -> Result<ValidationResult, DomainError>;

    /// Role-specific business rules (capability taxonomy, template customizations)
    async fn validate_business_rules(&self, draft: &RoleDraft)
        -> Result<ValidationResult, DomainError>;

    /// Number of roles whose `template_id` is `id`
    async fn count_derived(&self, id: Uuid) -> Result<usize, DomainError>;

    /// Undo the most recent mutation of `id` (idempotent)
    async fn rollback(&self, id: Uuid) -> Result<(), DomainError>;

    /// Drop the undo state kept for `id`; its last mutation is final
    fn release(&self, _id: Uuid) {}
}
