//! Consistency Validator
//!
//! Interprets typed consistency rules against the observed state of the
//! four subsystems. Every rule is evaluated and every violation reported.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use unicfg::{
    ConfigurationFile, ConsistencyPredicate, ConsistencyReport, ConsistencyRule,
    ConsistencyViolation, CoordinationError, DomainError, ObservedState, ServiceName,
    UnifiedConfiguration,
};

pub type ObservedServices = BTreeMap<ServiceName, ObservedState>;

/// Result of bounded eventual-consistency polling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyOutcome {
    Consistent(ConsistencyReport),
    /// Window elapsed; carries the last report observed
    NotYetConsistent(ConsistencyReport),
}

#[derive(Debug, Clone, Default)]
pub struct ConsistencyValidator;

impl ConsistencyValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn check(&self, services: &ObservedServices, rules: &[ConsistencyRule]) -> ConsistencyReport {
        let violations = rules
            .iter()
            .filter_map(|rule| self.evaluate(services, rule))
            .collect();
        ConsistencyReport::from_violations(violations)
    }

    fn evaluate(&self, services: &ObservedServices, rule: &ConsistencyRule) -> Option<ConsistencyViolation> {
        let violation = |detail: String| ConsistencyViolation {
            service: rule.service,
            description: rule.description.clone(),
            detail,
        };

        let Some(state) = services.get(&rule.service) else {
            return Some(violation(format!("{} state was not observed", rule.service)));
        };

        match &rule.predicate {
            ConsistencyPredicate::VersionAtLeast { min } => (state.version < *min)
                .then(|| violation(format!("version {} is below {}", state.version, min))),
            ConsistencyPredicate::FieldEquals { field, value } => match state.field(field) {
                Some(actual) if actual == value => None,
                Some(actual) => Some(violation(format!("{} is {}, expected {}", field, actual, value))),
                None => Some(violation(format!("{} is missing", field))),
            },
            ConsistencyPredicate::ReferenceNotNull { field } => match state.field(field) {
                Some(Value::Null) | None => Some(violation(format!("{} is null", field))),
                Some(_) => None,
            },
            ConsistencyPredicate::ReferenceMatches {
                field,
                sibling,
                sibling_field,
            } => {
                let Some(sibling_state) = services.get(sibling) else {
                    return Some(violation(format!("{} state was not observed", sibling)));
                };
                match (state.field(field), sibling_state.field(sibling_field)) {
                    (Some(ours), Some(theirs)) if ours == theirs => None,
                    (ours, theirs) => Some(violation(format!(
                        "{} = {} does not match {}.{} = {}",
                        field,
                        display_field(ours),
                        sibling,
                        sibling_field,
                        display_field(theirs)
                    ))),
                }
            }
            ConsistencyPredicate::ChecksumMatches { sibling } => {
                let theirs = services.get(sibling).and_then(|s| s.checksum.as_deref());
                match (state.checksum.as_deref(), theirs) {
                    (Some(ours), Some(theirs)) if ours == theirs => None,
                    (ours, theirs) => Some(violation(format!(
                        "checksum {} does not match {} checksum {}",
                        ours.unwrap_or("<none>"),
                        sibling,
                        theirs.unwrap_or("<none>")
                    ))),
                }
            }
        }
    }

    /// Rules every stored unified configuration must satisfy
    pub fn rules_for(&self, min_version: u64) -> Vec<ConsistencyRule> {
        use ConsistencyPredicate::*;
        use ServiceName::*;

        let matches = |field: &str, sibling: ServiceName, sibling_field: &str| ReferenceMatches {
            field: field.to_string(),
            sibling,
            sibling_field: sibling_field.to_string(),
        };

        vec![
            ConsistencyRule::new(Personality, VersionAtLeast { min: 1 }, "personality exists"),
            ConsistencyRule::new(Role, VersionAtLeast { min: 1 }, "role exists"),
            ConsistencyRule::new(
                Agent,
                VersionAtLeast { min: min_version },
                "agent reached the expected version",
            ),
            ConsistencyRule::new(
                Agent,
                ReferenceNotNull {
                    field: "personality_id".to_string(),
                },
                "agent references a personality",
            ),
            ConsistencyRule::new(
                Agent,
                matches("personality_id", Personality, "id"),
                "agent personality reference resolves",
            ),
            ConsistencyRule::new(Agent, matches("role_id", Role, "id"), "agent role reference resolves"),
            ConsistencyRule::new(
                Agent,
                matches("role_name", Role, "name"),
                "agent carries the current role name",
            ),
            ConsistencyRule::new(File, matches("agent_id", Agent, "id"), "file belongs to the agent"),
            ConsistencyRule::new(
                File,
                matches("version", Agent, "metadata.version"),
                "file rendered from the current agent version",
            ),
            ConsistencyRule::new(
                File,
                ChecksumMatches { sibling: Agent },
                "file content matches the configuration",
            ),
        ]
    }

    /// Observed state of each subsystem; a missing file is left unobserved
    pub fn observe(
        &self,
        config: &UnifiedConfiguration,
        file: Option<&ConfigurationFile>,
    ) -> Result<ObservedServices, DomainError> {
        let mut services = ObservedServices::new();
        services.insert(
            ServiceName::Personality,
            ObservedState::of(config.personality.version, &config.personality)?,
        );
        services.insert(ServiceName::Role, ObservedState::of(config.role.version, &config.role)?);
        services.insert(
            ServiceName::Agent,
            ObservedState::of(config.version(), &config.agent)?.with_checksum(config.checksum()?),
        );
        if let Some(file) = file {
            services.insert(
                ServiceName::File,
                ObservedState::of(file.version, file)?.with_checksum(file.checksum.clone()),
            );
        }
        Ok(services)
    }

    /// Poll `probe` until it reports consistency or `window` elapses
    pub async fn await_consistent<F, Fut>(
        &self,
        window: Duration,
        poll: Duration,
        mut probe: F,
    ) -> Result<ConsistencyOutcome, CoordinationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<ConsistencyReport, CoordinationError>>,
    {
        let deadline = Instant::now() + window;
        loop {
            let report = probe().await?;
            if report.is_consistent {
                return Ok(ConsistencyOutcome::Consistent(report));
            }
            if Instant::now() + poll > deadline {
                tracing::warn!(
                    violations = report.violations.len(),
                    window_ms = window.as_millis() as u64,
                    "Configuration not consistent within window"
                );
                return Ok(ConsistencyOutcome::NotYetConsistent(report));
            }
            tokio::time::sleep(poll).await;
        }
    }
}

fn display_field(value: Option<&Value>) -> String {
    value.map_or_else(|| "<missing>".to_string(), |v| v.to_string())
}
