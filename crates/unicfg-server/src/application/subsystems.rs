//! Subsystem handles injected into the coordinator

use std::sync::Arc;
use uuid::Uuid;

use unicfg::{
    AgentService, ConfigurationFileService, DependentsProbe, DomainError, PersonalityService,
    RoleService, ServiceName,
};

#[derive(Clone)]
pub struct Subsystems {
    pub personalities: Arc<dyn PersonalityService>,
    pub roles: Arc<dyn RoleService>,
    pub agents: Arc<dyn AgentService>,
    pub files: Arc<dyn ConfigurationFileService>,
    pub dependents: Arc<dyn DependentsProbe>,
}

impl Subsystems {
    /// Undo the last mutation `service` made to `entity_id`
    pub async fn rollback(&self, service: ServiceName, entity_id: Uuid) -> Result<(), DomainError> {
        match service {
            ServiceName::Personality => self.personalities.rollback(entity_id).await,
            ServiceName::Role => self.roles.rollback(entity_id).await,
            ServiceName::Agent => self.agents.rollback(entity_id).await,
            ServiceName::File => self.files.rollback(entity_id).await,
        }
    }

    /// Make `service`'s last mutation of `entity_id` final
    pub fn release(&self, service: ServiceName, entity_id: Uuid) {
        match service {
            ServiceName::Personality => self.personalities.release(entity_id),
            ServiceName::Role => self.roles.release(entity_id),
            ServiceName::Agent => self.agents.release(entity_id),
            ServiceName::File => self.files.release(entity_id),
        }
    }
}
