//! In-memory implementation of RoleService

use std::collections::HashSet;

use async_trait::async_trait;
use uuid::Uuid;

use unicfg::{
    CustomRole, DomainError, Operation, RoleDraft, RolePatch, RoleService, ServiceName,
    ValidationIssue, ValidationResult,
};

use super::{FaultPlan, MemoryStore};

const SERVICE: ServiceName = ServiceName::Role;

pub struct InMemoryRoleService {
    store: MemoryStore<CustomRole>,
    faults: FaultPlan,
}

impl InMemoryRoleService {
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

impl Default for InMemoryRoleService {
    fn default() -> Self {
        Self::new()
    }
}

fn is_snake_case(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('_')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[async_trait]
impl RoleService for InMemoryRoleService {
    async fn create(&self, draft: &RoleDraft) -> Result<CustomRole, DomainError> {
        self.faults.enact(SERVICE, Operation::Create).await?;
        let role = CustomRole::new(draft);
        self.store.insert(role.id, role.clone());
        Ok(role)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CustomRole>, DomainError> {
        self.faults.enact(SERVICE, Operation::Read).await?;
        Ok(self.store.get(id))
    }

    async fn update(&self, id: Uuid, patch: &RolePatch) -> Result<CustomRole, DomainError> {
        self.faults.enact(SERVICE, Operation::Update).await?;
        self.store
            .replace(id, |current| current.apply(patch))
            .ok_or_else(|| DomainError::not_found("Role", id))
    }

    async fn delete(&self, id: Uuid) -> Result<(), DomainError> {
        self.faults.enact(SERVICE, Operation::Delete).await?;
        self.store
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| DomainError::not_found("Role", id))
    }

    async fn validate_entity(&self, draft: &RoleDraft) -> Result<ValidationResult, DomainError> {
        self.faults.enact(SERVICE, Operation::Validate).await?;

        let mut errors = Vec::new();
        if draft.name.trim().is_empty() {
            errors.push(ValidationIssue::new(
                "role.name",
                "REQUIRED",
                "role name is required",
            ));
        }

        let mut seen = HashSet::new();
        for capability in &draft.capabilities {
            if !seen.insert(capability.as_str()) {
                errors.push(ValidationIssue::new(
                    "role.capabilities",
                    "DUPLICATE_CAPABILITY",
                    format!("capability '{}' is listed twice; keep one", capability),
                ));
            }
        }
        Ok(ValidationResult::from_errors(errors))
    }

    async fn validate_business_rules(
        &self,
        draft: &RoleDraft,
    ) -> Result<ValidationResult, DomainError> {
        self.faults.enact(SERVICE, Operation::Validate).await?;

        let mut errors: Vec<ValidationIssue> = draft
            .capabilities
            .iter()
            .filter(|c| !is_snake_case(c))
            .map(|c| {
                ValidationIssue::new(
                    "role.capabilities",
                    "INVALID_CAPABILITY_NAME",
                    format!(
                        "capability '{}' is not a snake_case identifier; rename it (e.g. 'web_access')",
                        c
                    ),
                )
            })
            .collect();

        if draft.template_id.is_none() && !draft.customizations.is_empty() {
            errors.push(ValidationIssue::new(
                "role.customizations",
                "CUSTOMIZATION_WITHOUT_TEMPLATE",
                "customizations apply on top of a template; set template_id or clear customizations",
            ));
        }
        Ok(ValidationResult::from_errors(errors))
    }

    async fn count_derived(&self, id: Uuid) -> Result<usize, DomainError> {
        self.faults.enact(SERVICE, Operation::Read).await?;
        Ok(self
            .store
            .all()
            .iter()
            .filter(|r| r.template_id == Some(id))
            .count())
    }

    async fn rollback(&self, id: Uuid) -> Result<(), DomainError> {
        self.faults.enact(SERVICE, Operation::Rollback).await?;
        if self.store.rollback(id) {
            tracing::debug!(role_id = %id, "Role rolled back");
        }
        Ok(())
    }

    fn release(&self, id: Uuid) {
        self.store.release(id);
    }
}
