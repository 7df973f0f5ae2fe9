//! Domain Entities
//!
//! Pure domain models without infrastructure dependencies.
//! - PersonalityConfiguration: traits and instructions (Personality subsystem)
//! - CustomRole: capabilities and constraints (Role subsystem)
//! - Agent: aggregate root referencing a personality and a role
//! - ConfigurationFile: rendered file artifact of a unified configuration
//! - UnifiedConfiguration: transient `{personality, role, agent}` aggregate
//! - WorkflowState: per-operation record of a unit of work

mod agent;
mod file;
mod personality;
mod role;
mod unified;
mod workflow;

pub use agent::*;
pub use file::*;
pub use personality::*;
pub use role::*;
pub use unified::*;
pub use workflow::*;
