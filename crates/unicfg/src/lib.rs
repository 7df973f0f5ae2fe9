//! Unicfg Domain Library
//!
//! Core domain types and interfaces for coordinating a unified agent
//! configuration (Personality + Role + Agent + rendered file artifact).
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain/`): Pure business entities and logic
//!   - `entities/`: Core domain models (Personality, Role, Agent, File, Workflow)
//!   - `value_objects/`: Immutable value types (ServiceName, ValidationResult, ...)
//!   - `errors/`: Domain and coordination error types
//!
//! - **Ports** (`ports/`): Abstract interfaces (traits)
//!   - `services/`: Subsystem service interfaces
//!   - `dependents`: Active dependent lookup
//!   - `observer`: Structured trace events
//!
//! # Usage
//!
//! ```rust,ignore
//! use unicfg::domain::{UnifiedConfiguration, UnifiedConfigurationRequest};
//! use unicfg::ports::{AgentService, PersonalityService};
//! ```

pub mod domain;
pub mod ports;

// Re-export commonly used types
pub use domain::{
    Agent, AgentDraft, AgentLinks, AgentMetadata, AgentPatch, AgentSettings, Behavior,
    CompensationRecord, ConfigurationFile, ConflictStrategy, ConsistencyPredicate,
    ConsistencyReport, ConsistencyRule, ConsistencyViolation, CoordinationError, CustomRole,
    Dependent, DependentKind, DomainError, FailureContext, ObservedState, Operation,
    PersonalityConfiguration, PersonalityDraft, PersonalityPatch, PlannedStep, RoleDraft,
    RolePatch, ServiceName, StepRecord, StepStatus, UnifiedConfiguration,
    UnifiedConfigurationRequest, UnifiedConfigurationUpdate, ValidationIssue, ValidationLayer,
    ValidationResult, WorkflowState, WorkflowStatus,
};
pub use ports::{
    AgentService, ConfigurationFileService, DependentsProbe, PersonalityService, RoleService,
    TraceEvent, TraceObserver, TracePhase,
};
