//! Resilience Layer - Per-service circuit breakers and failure classification
//!
//! ```text
//!   closed ──(threshold consecutive failures)──► open
//!     ▲                                           │ cooldown elapsed
//!     │ trial succeeds                            ▼
//!     └──────────────────────────────────── half-open ──(trial fails)──► open
//! ```
//!
//! Every guarded call runs under the step budget; a timeout counts as a
//! failure. While a circuit is open, calls fail fast without reaching the
//! adapter. A failure reporting an unavailable upstream dependency is
//! charged to the upstream's circuit, not the caller's.

use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use unicfg::{CoordinationError, DomainError, FailureContext, Operation, ServiceName};

use super::config::CircuitConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

struct ServiceCircuit {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// Set while the single half-open trial call is in flight
    trial_started: Option<Instant>,
    total_calls: u64,
    total_failures: u64,
    rejected_calls: u64,
}

impl ServiceCircuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            trial_started: None,
            total_calls: 0,
            total_failures: 0,
            rejected_calls: 0,
        }
    }

    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.trial_started = None;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitStats {
    pub service: ServiceName,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub total_calls: u64,
    pub total_failures: u64,
    pub rejected_calls: u64,
    /// Remaining cooldown while open
    pub retry_after_ms: Option<u64>,
}

/// Why a guarded call did not produce a value
#[derive(Debug, Clone, Error)]
pub enum GuardFailure {
    #[error("circuit open, retry after {retry_after_ms}ms")]
    Open { retry_after_ms: u64 },

    #[error(transparent)]
    Failed(DomainError),
}

/// Admission decision for one call
enum Admission {
    Allowed,
    Rejected { retry_after_ms: u64 },
}

pub struct CircuitBreakerRegistry {
    circuits: RwLock<HashMap<ServiceName, ServiceCircuit>>,
    config: CircuitConfig,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            circuits: RwLock::new(HashMap::new()),
            config,
        }
    }

    fn admit(&self, service: ServiceName) -> Admission {
        let now = Instant::now();
        let cooldown = self.config.cooldown();
        let mut circuits = self.circuits.write();
        let circuit = circuits.entry(service).or_insert_with(ServiceCircuit::new);

        let admission = match circuit.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open => {
                let elapsed = circuit
                    .opened_at
                    .map(|at| now.duration_since(at))
                    .unwrap_or(cooldown);
                if elapsed >= cooldown {
                    info!(service = %service, "Circuit half-open, allowing trial call");
                    circuit.state = CircuitState::HalfOpen;
                    circuit.trial_started = Some(now);
                    Admission::Allowed
                } else {
                    Admission::Rejected {
                        retry_after_ms: (cooldown - elapsed).as_millis() as u64,
                    }
                }
            }
            CircuitState::HalfOpen => match circuit.trial_started {
                // A trial abandoned mid-flight (caller dropped) must not wedge the circuit
                Some(started) if now.duration_since(started) < cooldown => {
                    Admission::Rejected {
                        retry_after_ms: (cooldown - now.duration_since(started)).as_millis()
                            as u64,
                    }
                }
                _ => {
                    circuit.trial_started = Some(now);
                    Admission::Allowed
                }
            },
        };

        match admission {
            Admission::Allowed => circuit.total_calls += 1,
            Admission::Rejected { .. } => circuit.rejected_calls += 1,
        }
        admission
    }

    pub fn record_success(&self, service: ServiceName) {
        let mut circuits = self.circuits.write();
        let circuit = circuits.entry(service).or_insert_with(ServiceCircuit::new);
        if circuit.state == CircuitState::HalfOpen {
            info!(service = %service, "Circuit closed after successful trial");
        }
        circuit.state = CircuitState::Closed;
        circuit.consecutive_failures = 0;
        circuit.opened_at = None;
        circuit.trial_started = None;
    }

    pub fn record_failure(&self, service: ServiceName) {
        let now = Instant::now();
        let mut circuits = self.circuits.write();
        let circuit = circuits.entry(service).or_insert_with(ServiceCircuit::new);
        circuit.total_failures += 1;
        circuit.consecutive_failures += 1;

        match circuit.state {
            CircuitState::Closed => {
                if circuit.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        service = %service,
                        failures = circuit.consecutive_failures,
                        cooldown_ms = self.config.cooldown_ms,
                        "Circuit opening"
                    );
                    circuit.open(now);
                }
            }
            CircuitState::HalfOpen => {
                warn!(service = %service, "Circuit reopening after failed trial");
                circuit.open(now);
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self, service: ServiceName) -> CircuitState {
        self.circuits
            .read()
            .get(&service)
            .map(|c| c.state)
            .unwrap_or(CircuitState::Closed)
    }

    pub fn is_open(&self, service: ServiceName) -> bool {
        self.state(service) == CircuitState::Open
    }

    /// Run `call` through `service`'s circuit under `budget`
    pub async fn call<T, F>(
        &self,
        service: ServiceName,
        operation: Operation,
        budget: Duration,
        call: F,
    ) -> Result<T, GuardFailure>
    where
        F: Future<Output = Result<T, DomainError>>,
    {
        if let Admission::Rejected { retry_after_ms } = self.admit(service) {
            debug!(service = %service, operation = %operation, retry_after_ms, "Call short-circuited");
            return Err(GuardFailure::Open { retry_after_ms });
        }

        let outcome = match tokio::time::timeout(budget, call).await {
            Ok(result) => result,
            Err(_) => Err(DomainError::Timeout {
                service,
                operation,
                budget_ms: budget.as_millis() as u64,
            }),
        };

        match &outcome {
            Ok(_) => self.record_success(service),
            Err(DomainError::DependencyUnavailable { dependency, .. }) if *dependency != service => {
                // The caller responded; its upstream did not
                self.record_success(service);
                self.record_failure(*dependency);
            }
            Err(_) => self.record_failure(service),
        }

        outcome.map_err(GuardFailure::Failed)
    }

    /// Turn a guard failure into a coordination error.
    ///
    /// A dependency-unavailable failure is a cascade when the unavailable
    /// service is a declared upstream of the caller, took part in the same
    /// workflow (`involved`), or has an open circuit.
    pub fn classify(
        &self,
        context: FailureContext,
        failure: GuardFailure,
        involved: &[ServiceName],
    ) -> CoordinationError {
        match failure {
            GuardFailure::Open { retry_after_ms } => CoordinationError::CircuitOpen {
                context,
                retry_after_ms,
            },
            GuardFailure::Failed(source) => match &source {
                DomainError::DependencyUnavailable { dependency, .. }
                    if context.service.depends_on(*dependency)
                        || involved.contains(dependency)
                        || self.is_open(*dependency) =>
                {
                    CoordinationError::Cascading {
                        context,
                        upstream: *dependency,
                        source,
                    }
                }
                _ => CoordinationError::Communication { context, source },
            },
        }
    }

    pub fn stats(&self) -> Vec<CircuitStats> {
        let now = Instant::now();
        let cooldown = self.config.cooldown();
        let circuits = self.circuits.read();
        let mut stats: Vec<CircuitStats> = circuits
            .iter()
            .map(|(service, circuit)| CircuitStats {
                service: *service,
                state: circuit.state,
                consecutive_failures: circuit.consecutive_failures,
                total_calls: circuit.total_calls,
                total_failures: circuit.total_failures,
                rejected_calls: circuit.rejected_calls,
                retry_after_ms: match (circuit.state, circuit.opened_at) {
                    (CircuitState::Open, Some(at)) => {
                        Some(cooldown.saturating_sub(now.duration_since(at)).as_millis() as u64)
                    }
                    _ => None,
                },
            })
            .collect();
        stats.sort_by_key(|s| s.service);
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn registry(cooldown_ms: u64) -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::new(CircuitConfig {
            failure_threshold: 3,
            cooldown_ms,
        })
    }

    async fn fail(registry: &CircuitBreakerRegistry, service: ServiceName) -> GuardFailure {
        registry
            .call::<(), _>(service, Operation::Create, Duration::from_millis(100), async {
                Err(DomainError::ExternalService("down".to_string()))
            })
            .await
            .unwrap_err()
    }

    #[tokio::test]
    async fn test_circuit_opens_after_threshold_and_fails_fast() {
        let registry = registry(5000);
        for _ in 0..3 {
            fail(&registry, ServiceName::Role).await;
        }
        assert_eq!(registry.state(ServiceName::Role), CircuitState::Open);

        let invoked = AtomicUsize::new(0);
        let result = registry
            .call(ServiceName::Role, Operation::Create, Duration::from_millis(100), async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, DomainError>(())
            })
            .await;

        assert!(matches!(result, Err(GuardFailure::Open { .. })));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_half_open_trial_success_closes() {
        let registry = registry(20);
        for _ in 0..3 {
            fail(&registry, ServiceName::Agent).await;
        }
        tokio::time::sleep(Duration::from_millis(40)).await;

        let result = registry
            .call(ServiceName::Agent, Operation::Create, Duration::from_millis(100), async {
                Ok::<_, DomainError>(7)
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(registry.state(ServiceName::Agent), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_trial_failure_reopens() {
        let registry = registry(20);
        for _ in 0..3 {
            fail(&registry, ServiceName::Agent).await;
        }
        tokio::time::sleep(Duration::from_millis(40)).await;

        fail(&registry, ServiceName::Agent).await;
        assert_eq!(registry.state(ServiceName::Agent), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let registry = registry(5000);
        let result = registry
            .call(ServiceName::File, Operation::Create, Duration::from_millis(10), async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, DomainError>(())
            })
            .await;

        assert!(matches!(
            result,
            Err(GuardFailure::Failed(DomainError::Timeout { .. }))
        ));
        let stats = registry.stats();
        assert_eq!(stats[0].consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_dependency_failure_is_charged_upstream_and_classified_as_cascade() {
        let registry = registry(5000);
        let failure = registry
            .call::<(), _>(ServiceName::Agent, Operation::Create, Duration::from_millis(100), async {
                Err(DomainError::DependencyUnavailable {
                    dependency: ServiceName::Role,
                    message: "role store unreachable".to_string(),
                })
            })
            .await
            .unwrap_err();

        let stats = registry.stats();
        let role = stats.iter().find(|s| s.service == ServiceName::Role).unwrap();
        let agent = stats.iter().find(|s| s.service == ServiceName::Agent).unwrap();
        assert_eq!(role.total_failures, 1);
        assert_eq!(agent.total_failures, 0);

        let context = FailureContext::new(ServiceName::Agent, Operation::Create, 3, Uuid::new_v4());
        let err = registry.classify(context, failure, &[ServiceName::Role]);
        assert!(err.is_cascade());
    }

    #[test]
    fn test_declared_upstream_failure_is_a_cascade() {
        let registry = registry(5000);
        let failure = GuardFailure::Failed(DomainError::DependencyUnavailable {
            dependency: ServiceName::Personality,
            message: "personality store unreachable".to_string(),
        });
        let context = FailureContext::new(ServiceName::File, Operation::Update, 4, Uuid::new_v4());

        let err = registry.classify(context, failure, &[]);
        assert!(matches!(
            err,
            CoordinationError::Cascading {
                upstream: ServiceName::Personality,
                ..
            }
        ));
    }

    #[test]
    fn test_unrelated_dependency_failure_is_independent() {
        let registry = registry(5000);
        let failure = GuardFailure::Failed(DomainError::DependencyUnavailable {
            dependency: ServiceName::Agent,
            message: "flaky".to_string(),
        });
        let context =
            FailureContext::new(ServiceName::Personality, Operation::Read, 0, Uuid::new_v4());

        let err = registry.classify(context, failure, &[]);
        assert!(matches!(err, CoordinationError::Communication { .. }));
    }
}
