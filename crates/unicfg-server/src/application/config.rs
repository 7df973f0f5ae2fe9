//! Coordinator configuration
//!
//! All timing budgets live in `TimingBudgets`; nothing else in the crate
//! hard-codes a duration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use unicfg::ConflictStrategy;

/// Timing budgets for every operation class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingBudgets {
    /// Single guarded adapter call
    pub step_ms: u64,
    /// One validation layer
    pub validation_layer_ms: u64,
    /// Whole validation pass
    pub validation_total_ms: u64,
    /// Whole compensation pass
    pub compensation_ms: u64,
    /// Full create; exceeding it is logged, not enforced
    pub create_warn_ms: u64,
    /// Eventual-consistency polling window
    pub consistency_window_ms: u64,
    pub consistency_poll_ms: u64,
}

impl Default for TimingBudgets {
    fn default() -> Self {
        Self {
            step_ms: 200,
            validation_layer_ms: 300,
            validation_total_ms: 1000,
            compensation_ms: 500,
            create_warn_ms: 1000,
            consistency_window_ms: 5000,
            consistency_poll_ms: 100,
        }
    }
}

impl TimingBudgets {
    pub fn step(&self) -> Duration {
        Duration::from_millis(self.step_ms)
    }

    pub fn validation_layer(&self) -> Duration {
        Duration::from_millis(self.validation_layer_ms)
    }

    pub fn validation_total(&self) -> Duration {
        Duration::from_millis(self.validation_total_ms)
    }

    pub fn compensation(&self) -> Duration {
        Duration::from_millis(self.compensation_ms)
    }

    pub fn create_warn(&self) -> Duration {
        Duration::from_millis(self.create_warn_ms)
    }

    pub fn consistency_window(&self) -> Duration {
        Duration::from_millis(self.consistency_window_ms)
    }

    pub fn consistency_poll(&self) -> Duration {
        Duration::from_millis(self.consistency_poll_ms)
    }
}

/// Per-service circuit breaker settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// Time an open circuit waits before letting a trial call through
    pub cooldown_ms: u64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_ms: 5000,
        }
    }
}

impl CircuitConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Personality trait a role capability needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitRequirement {
    pub capability: String,
    pub trait_name: String,
    pub min: f64,
}

/// Cross-subsystem rules applied by the validation aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationPolicy {
    /// Capabilities no agent may hold
    pub forbidden_capabilities: Vec<String>,
    /// Capability name prefixes that indicate a policy bypass
    pub bypass_prefixes: Vec<String>,
    /// Regions agent data may reside in; empty allows any region
    pub allowed_regions: Vec<String>,
    pub require_encryption: bool,
    /// Capability -> model name prefixes that support it
    pub model_capabilities: BTreeMap<String, Vec<String>>,
    pub trait_requirements: Vec<TraitRequirement>,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        let mut model_capabilities = BTreeMap::new();
        model_capabilities.insert(
            "vision".to_string(),
            vec!["gpt-4o".to_string(), "claude-3".to_string(), "gemini".to_string()],
        );
        model_capabilities.insert(
            "long_context".to_string(),
            vec!["claude".to_string(), "gemini".to_string()],
        );

        Self {
            forbidden_capabilities: vec![
                "unrestricted_shell".to_string(),
                "credential_access".to_string(),
            ],
            bypass_prefixes: vec![
                "bypass_".to_string(),
                "override_".to_string(),
                "disable_".to_string(),
            ],
            allowed_regions: Vec::new(),
            require_encryption: true,
            model_capabilities,
            trait_requirements: vec![
                TraitRequirement {
                    capability: "customer_support".to_string(),
                    trait_name: "empathy".to_string(),
                    min: 0.4,
                },
                TraitRequirement {
                    capability: "code_review".to_string(),
                    trait_name: "precision".to_string(),
                    min: 0.5,
                },
            ],
        }
    }
}

impl ValidationPolicy {
    pub fn with_allowed_regions(mut self, regions: &[&str]) -> Self {
        self.allowed_regions = regions.iter().map(|r| r.to_string()).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub budgets: TimingBudgets,
    pub circuit: CircuitConfig,
    pub conflict_strategy: ConflictStrategy,
    /// Reject stale `expected_version` updates instead of resolving them
    pub strict_versioning: bool,
    pub validation: ValidationPolicy,
    /// Finished workflows kept for audit and recovery
    pub journal_capacity: usize,
    /// Applied changes kept per aggregate for conflict resolution
    pub history_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            budgets: TimingBudgets::default(),
            circuit: CircuitConfig::default(),
            conflict_strategy: ConflictStrategy::default(),
            strict_versioning: false,
            validation: ValidationPolicy::default(),
            journal_capacity: 256,
            history_capacity: 32,
        }
    }
}

impl CoordinatorConfig {
    pub fn with_budgets(mut self, budgets: TimingBudgets) -> Self {
        self.budgets = budgets;
        self
    }

    pub fn with_circuit(mut self, failure_threshold: u32, cooldown_ms: u64) -> Self {
        self.circuit = CircuitConfig {
            failure_threshold,
            cooldown_ms,
        };
        self
    }

    pub fn with_conflict_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.conflict_strategy = strategy;
        self
    }

    pub fn with_strict_versioning(mut self, strict: bool) -> Self {
        self.strict_versioning = strict;
        self
    }

    pub fn with_validation_policy(mut self, policy: ValidationPolicy) -> Self {
        self.validation = policy;
        self
    }
}
