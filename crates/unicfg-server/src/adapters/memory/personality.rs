//! In-memory implementation of PersonalityService

use async_trait::async_trait;
use uuid::Uuid;

use unicfg::{
    DomainError, Operation, PersonalityConfiguration, PersonalityDraft, PersonalityPatch,
    PersonalityService, ServiceName, ValidationIssue, ValidationResult,
};

use super::{FaultPlan, MemoryStore};

const SERVICE: ServiceName = ServiceName::Personality;

pub struct InMemoryPersonalityService {
    store: MemoryStore<PersonalityConfiguration>,
    faults: FaultPlan,
}

impl InMemoryPersonalityService {
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

impl Default for InMemoryPersonalityService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersonalityService for InMemoryPersonalityService {
    async fn create(
        &self,
        draft: &PersonalityDraft,
    ) -> Result<PersonalityConfiguration, DomainError> {
        self.faults.enact(SERVICE, Operation::Create).await?;
        let personality = PersonalityConfiguration::new(draft);
        self.store.insert(personality.id, personality.clone());
        Ok(personality)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PersonalityConfiguration>, DomainError> {
        self.faults.enact(SERVICE, Operation::Read).await?;
        Ok(self.store.get(id))
    }

    async fn update(
        &self,
        id: Uuid,
        patch: &PersonalityPatch,
    ) -> Result<PersonalityConfiguration, DomainError> {
        self.faults.enact(SERVICE, Operation::Update).await?;
        self.store
            .replace(id, |current| current.apply(patch))
            .ok_or_else(|| DomainError::not_found("Personality", id))
    }

    async fn delete(&self, id: Uuid) -> Result<(), DomainError> {
        self.faults.enact(SERVICE, Operation::Delete).await?;
        self.store
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| DomainError::not_found("Personality", id))
    }

    async fn validate_entity(
        &self,
        draft: &PersonalityDraft,
    ) -> Result<ValidationResult, DomainError> {
        self.faults.enact(SERVICE, Operation::Validate).await?;

        let mut errors = Vec::new();
        if draft.name.trim().is_empty() {
            errors.push(ValidationIssue::new(
                "personality.name",
                "REQUIRED",
                "personality name is required",
            ));
        }
        for (name, value) in &draft.traits {
            if !(0.0..=1.0).contains(value) {
                errors.push(ValidationIssue::new(
                    format!("personality.traits.{}", name),
                    "TRAIT_OUT_OF_RANGE",
                    format!("trait '{}' is {}; use a value between 0.0 and 1.0", name, value),
                ));
            }
        }
        Ok(ValidationResult::from_errors(errors))
    }

    async fn rollback(&self, id: Uuid) -> Result<(), DomainError> {
        self.faults.enact(SERVICE, Operation::Rollback).await?;
        if self.store.rollback(id) {
            tracing::debug!(personality_id = %id, "Personality rolled back");
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

    #[tokio::test]
    async fn test_trait_range_is_validated() {
        let service = InMemoryPersonalityService::new();
        let draft = PersonalityDraft::new("Wild").with_trait("curiosity", 1.4);

        let result = service.validate_entity(&draft).await.unwrap();
        assert_eq!(result.codes(), vec!["TRAIT_OUT_OF_RANGE"]);
        assert_eq!(result.errors[0].field, "personality.traits.curiosity");
    }

    #[tokio::test]
    async fn test_update_then_rollback() {
        let service = InMemoryPersonalityService::new();
        let created = service
            .create(&PersonalityDraft::new("Calm"))
            .await
            .unwrap();

        let patch = PersonalityPatch {
            name: Some("Brisk".to_string()),
            ..Default::default()
        };
        let updated = service.update(created.id, &patch).await.unwrap();
        assert_eq!(updated.version, 2);

        service.rollback(created.id).await.unwrap();
        assert_eq!(service.find_by_id(created.id).await.unwrap(), Some(created));
    }

    #[tokio::test]
    async fn test_update_of_missing_personality() {
        let service = InMemoryPersonalityService::new();
        let err = service
            .update(Uuid::new_v4(), &PersonalityPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }
}
