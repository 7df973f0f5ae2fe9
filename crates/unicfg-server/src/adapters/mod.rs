//! Infrastructure Adapters
//!
//! Implementations of the subsystem ports: in-memory Personality, Role and
//! Agent services, a filesystem artifact writer, a dependents probe and
//! trace observers.

pub mod artifact;
pub mod dependents;
pub mod memory;
pub mod observer;

// Re-exports
pub use artifact::FsConfigurationFiles;
pub use dependents::InMemoryDependents;
pub use memory::{FaultPlan, InMemoryAgentService, InMemoryPersonalityService, InMemoryRoleService};
pub use observer::{RecordingObserver, TracingObserver};

use std::path::PathBuf;
use std::sync::Arc;

use crate::application::Subsystems;

/// The concrete adapters wired together, kept typed so faults can be scripted
#[derive(Clone)]
pub struct LocalSubsystems {
    pub personalities: Arc<InMemoryPersonalityService>,
    pub roles: Arc<InMemoryRoleService>,
    pub agents: Arc<InMemoryAgentService>,
    pub files: Arc<FsConfigurationFiles>,
    pub dependents: Arc<InMemoryDependents>,
}

impl LocalSubsystems {
    pub fn new(artifact_dir: impl Into<PathBuf>) -> Self {
        Self {
            personalities: Arc::new(InMemoryPersonalityService::new()),
            roles: Arc::new(InMemoryRoleService::new()),
            agents: Arc::new(InMemoryAgentService::new()),
            files: Arc::new(FsConfigurationFiles::new(artifact_dir)),
            dependents: Arc::new(InMemoryDependents::new()),
        }
    }

    pub fn subsystems(&self) -> Subsystems {
        Subsystems {
            personalities: self.personalities.clone(),
            roles: self.roles.clone(),
            agents: self.agents.clone(),
            files: self.files.clone(),
            dependents: self.dependents.clone(),
        }
    }
}
