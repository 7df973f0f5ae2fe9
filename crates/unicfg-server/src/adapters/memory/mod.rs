//! In-Memory Subsystem Implementations
//!
//! Reference collaborators for the Personality, Role and Agent subsystems.
//! Each keeps the pre-image of its last mutation per entity so `rollback`
//! can restore it, and runs every call through a `FaultPlan`.

mod agent;
mod personality;
mod role;

pub use agent::InMemoryAgentService;
pub use personality::InMemoryPersonalityService;
pub use role::InMemoryRoleService;

use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use unicfg::domain::ResolvedBehavior;
use unicfg::{Behavior, DomainError, Operation, ServiceName};

/// Scripted behavior per operation plus a call log
#[derive(Debug, Default)]
pub struct FaultPlan {
    behaviors: RwLock<HashMap<Operation, Behavior>>,
    calls: Mutex<HashMap<Operation, usize>>,
}

impl FaultPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, operation: Operation, behavior: Behavior) {
        self.behaviors.write().insert(operation, behavior);
    }

    /// Back to `Succeed` for every operation; the call log is kept
    pub fn clear(&self) {
        self.behaviors.write().clear();
    }

    /// Number of times `operation` was invoked, whatever its outcome
    pub fn calls(&self, operation: Operation) -> usize {
        self.calls.lock().get(&operation).copied().unwrap_or(0)
    }

    pub async fn enact(&self, service: ServiceName, operation: Operation) -> Result<(), DomainError> {
        *self.calls.lock().entry(operation).or_insert(0) += 1;
        let behavior = self
            .behaviors
            .read()
            .get(&operation)
            .cloned()
            .unwrap_or_default();

        let (delay, outcome) = behavior.resolve();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match outcome {
            ResolvedBehavior::Succeed => Ok(()),
            ResolvedBehavior::FailWith(reason) => Err(DomainError::ExternalService(format!(
                "{} {}: {}",
                service, operation, reason
            ))),
            ResolvedBehavior::DependencyDown(dependency) => {
                Err(DomainError::DependencyUnavailable {
                    dependency,
                    message: format!("{} {} could not reach {}", service, operation, dependency),
                })
            }
        }
    }
}

/// Records keyed by id, with the pre-image of each record's last mutation
#[derive(Debug)]
pub(crate) struct MemoryStore<E> {
    records: RwLock<HashMap<Uuid, E>>,
    /// `None` pre-image: the record did not exist before
    undo: Mutex<HashMap<Uuid, Option<E>>>,
}

impl<E: Clone> MemoryStore<E> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            undo: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, id: Uuid) -> Option<E> {
        self.records.read().get(&id).cloned()
    }

    pub fn all(&self) -> Vec<E> {
        self.records.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn insert(&self, id: Uuid, record: E) {
        let previous = self.records.write().insert(id, record);
        self.undo.lock().insert(id, previous);
    }

    /// Replace a record with `f(current)`; `None` when absent
    pub fn replace(&self, id: Uuid, f: impl FnOnce(&E) -> E) -> Option<E> {
        let mut records = self.records.write();
        let current = records.get(&id)?.clone();
        let next = f(&current);
        records.insert(id, next.clone());
        self.undo.lock().insert(id, Some(current));
        Some(next)
    }

    pub fn remove(&self, id: Uuid) -> Option<E> {
        let removed = self.records.write().remove(&id)?;
        self.undo.lock().insert(id, Some(removed.clone()));
        Some(removed)
    }

    /// Forget the pre-image of `id`; a later rollback is a no-op
    pub fn release(&self, id: Uuid) {
        self.undo.lock().remove(&id);
    }

    #[cfg(test)]
    pub fn pending_undo(&self) -> usize {
        self.undo.lock().len()
    }

    /// Restore the pre-image of the last mutation; a second call is a no-op
    pub fn rollback(&self, id: Uuid) -> bool {
        let Some(previous) = self.undo.lock().remove(&id) else {
            return false;
        };
        let mut records = self.records.write();
        match previous {
            Some(record) => {
                records.insert(id, record);
            }
            None => {
                records.remove(&id);
            }
        }
        true
    }
}
