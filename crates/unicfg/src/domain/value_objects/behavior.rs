//! Behavior - Closed set of outcomes a subsystem call can be scripted with
//!
//! In-memory subsystem adapters attach one `Behavior` per operation so that
//! failure injection in tests and ops drills uses the same code path as
//! production calls.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ServiceName;

/// Scripted outcome of a subsystem call
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    /// Perform the operation normally
    #[default]
    Succeed,
    /// Fail with the given reason without performing the operation
    FailWith(String),
    /// Wait `ms` milliseconds, then resolve with the inner behavior
    DelayThen(u64, Box<Behavior>),
    /// Fail reporting that an upstream subsystem is unavailable
    DependencyDown(ServiceName),
}

/// Flattened behavior: total delay plus the terminal outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedBehavior {
    Succeed,
    FailWith(String),
    DependencyDown(ServiceName),
}

impl Behavior {
    pub fn fail_with(reason: impl Into<String>) -> Self {
        Behavior::FailWith(reason.into())
    }

    pub fn delay_then(ms: u64, then: Behavior) -> Self {
        Behavior::DelayThen(ms, Box::new(then))
    }

    /// Collapse nested delays into one duration and a terminal outcome
    pub fn resolve(&self) -> (Duration, ResolvedBehavior) {
        match self {
            Behavior::Succeed => (Duration::ZERO, ResolvedBehavior::Succeed),
            Behavior::FailWith(reason) => {
                (Duration::ZERO, ResolvedBehavior::FailWith(reason.clone()))
            }
            Behavior::DependencyDown(service) => {
                (Duration::ZERO, ResolvedBehavior::DependencyDown(*service))
            }
            Behavior::DelayThen(ms, then) => {
                let (inner, outcome) = then.resolve();
                (Duration::from_millis(*ms) + inner, outcome)
            }
        }
    }
}
