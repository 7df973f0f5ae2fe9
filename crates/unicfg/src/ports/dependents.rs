//! Dependents Port
//!
//! Reports external references (conversations, scheduled tasks, ...) that
//! must block deleting an agent configuration.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::{Dependent, DomainError};

#[async_trait]
pub trait DependentsProbe: Send + Sync {
    /// Active dependents of `agent_id`; empty when nothing blocks deletion
    async fn active_dependents(&self, agent_id: Uuid) -> Result<Vec<Dependent>, DomainError>;
}
