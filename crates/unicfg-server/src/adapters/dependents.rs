//! In-memory DependentsProbe
//!
//! Stands in for the systems that hold references to an agent
//! (conversations, schedulers). Operators or tests register counts per agent.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use unicfg::{Dependent, DependentsProbe, DomainError};

#[derive(Debug, Default)]
pub struct InMemoryDependents {
    dependents: RwLock<HashMap<Uuid, Vec<Dependent>>>,
}

impl InMemoryDependents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, agent_id: Uuid, dependents: Vec<Dependent>) {
        self.dependents.write().insert(agent_id, dependents);
    }

    pub fn clear(&self, agent_id: Uuid) {
        self.dependents.write().remove(&agent_id);
    }
}

#[async_trait]
impl DependentsProbe for InMemoryDependents {
    async fn active_dependents(&self, agent_id: Uuid) -> Result<Vec<Dependent>, DomainError> {
        Ok(self
            .dependents
            .read()
            .get(&agent_id)
            .cloned()
            .unwrap_or_default())
    }
}
