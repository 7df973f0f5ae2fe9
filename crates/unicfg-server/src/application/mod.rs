//! Application Layer (Use Cases)
//!
//! Coordinates units of work across the four subsystems:
//! validation, transactions with compensation, consistency checks,
//! conflict resolution and circuit breaking.

pub mod config;
pub mod conflict;
pub mod consistency;
pub mod journal;
pub mod resilience;
mod subsystems;
mod transaction;
mod unified_config_service;
mod validation;

pub use config::{CircuitConfig, CoordinatorConfig, TimingBudgets, ValidationPolicy};
pub use consistency::ConsistencyOutcome;
pub use journal::JournalEntry;
pub use resilience::{CircuitState, CircuitStats};
pub use subsystems::Subsystems;
pub use transaction::TransactionCoordinator;
pub use unified_config_service::UnifiedConfigurationService;
pub use validation::ValidationAggregator;
