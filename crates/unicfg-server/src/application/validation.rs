//! Validation Aggregator
//!
//! Runs the four validation layers in order and stops at the first layer
//! that reports errors. No mutating adapter call is made from here.

use std::future::Future;
use std::sync::Arc;

use tokio::time::timeout;
use uuid::Uuid;

use unicfg::{
    CoordinationError, DomainError, FailureContext, Operation, ServiceName,
    UnifiedConfigurationRequest, ValidationIssue, ValidationLayer, ValidationResult,
};

use super::config::{TimingBudgets, ValidationPolicy};
use super::resilience::CircuitBreakerRegistry;
use super::subsystems::Subsystems;

pub struct ValidationAggregator {
    subsystems: Subsystems,
    breakers: Arc<CircuitBreakerRegistry>,
    policy: ValidationPolicy,
    budgets: TimingBudgets,
}

impl ValidationAggregator {
    pub fn new(
        subsystems: Subsystems,
        breakers: Arc<CircuitBreakerRegistry>,
        policy: ValidationPolicy,
        budgets: TimingBudgets,
    ) -> Self {
        Self {
            subsystems,
            breakers,
            policy,
            budgets,
        }
    }

    /// Validate a prospective configuration.
    ///
    /// `existing_agent` is the aggregate being updated, whose own name does
    /// not count as a collision.
    pub async fn validate(
        &self,
        request: &UnifiedConfigurationRequest,
        existing_agent: Option<Uuid>,
    ) -> Result<ValidationResult, CoordinationError> {
        let correlation = Uuid::new_v4();
        let total = self.budgets.validation_total();

        match timeout(total, self.run_layers(request, existing_agent, correlation)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(correlation = %correlation, "Validation exceeded total budget");
                Ok(ValidationResult::from_errors(vec![ValidationIssue::new(
                    "request",
                    "VALIDATION_TIMEOUT",
                    format!(
                        "validation did not finish within {}ms; retry once subsystems recover",
                        total.as_millis()
                    ),
                )]))
            }
        }
    }

    async fn run_layers(
        &self,
        request: &UnifiedConfigurationRequest,
        existing_agent: Option<Uuid>,
        correlation: Uuid,
    ) -> Result<ValidationResult, CoordinationError> {
        let layer_budget = self.budgets.validation_layer();

        for layer in ValidationLayer::ORDER {
            let outcome = timeout(
                layer_budget,
                self.run_layer(layer, request, existing_agent, correlation),
            )
            .await;
            let result = match outcome {
                Ok(result) => result?,
                Err(_) => ValidationResult::from_errors(vec![ValidationIssue::new(
                    layer.to_string(),
                    "VALIDATION_TIMEOUT",
                    format!(
                        "{} validation did not finish within {}ms; retry once subsystems recover",
                        layer,
                        layer_budget.as_millis()
                    ),
                )]),
            }
            .with_layer(layer);

            if !result.is_valid {
                tracing::info!(
                    correlation = %correlation,
                    layer = %layer,
                    errors = result.errors.len(),
                    "Validation failed"
                );
                return Ok(result);
            }
        }

        Ok(ValidationResult::valid())
    }

    async fn run_layer(
        &self,
        layer: ValidationLayer,
        request: &UnifiedConfigurationRequest,
        existing_agent: Option<Uuid>,
        correlation: Uuid,
    ) -> Result<ValidationResult, CoordinationError> {
        match layer {
            ValidationLayer::Schema => self.schema(request, correlation).await,
            ValidationLayer::BusinessRules => self.business_rules(request, correlation).await,
            ValidationLayer::Security => self.security(request, correlation).await,
            ValidationLayer::Dependency => {
                self.dependency(request, existing_agent, correlation).await
            }
        }
    }

    async fn guarded<T>(
        &self,
        service: ServiceName,
        correlation: Uuid,
        call: impl Future<Output = Result<T, DomainError>>,
    ) -> Result<T, CoordinationError> {
        self.breakers
            .call(service, Operation::Validate, self.budgets.step(), call)
            .await
            .map_err(|failure| {
                let context = FailureContext::new(service, Operation::Validate, 0, correlation);
                self.breakers.classify(context, failure, &[])
            })
    }

    async fn schema(
        &self,
        request: &UnifiedConfigurationRequest,
        correlation: Uuid,
    ) -> Result<ValidationResult, CoordinationError> {
        let s = &self.subsystems;
        let (personality, role, agent, file) = tokio::join!(
            self.guarded(
                ServiceName::Personality,
                correlation,
                s.personalities.validate_entity(&request.personality)
            ),
            self.guarded(ServiceName::Role, correlation, s.roles.validate_entity(&request.role)),
            self.guarded(ServiceName::Agent, correlation, s.agents.validate_entity(&request.agent)),
            self.guarded(ServiceName::File, correlation, s.files.validate_entity(&request.agent)),
        );
        Ok(personality?.merge(role?).merge(agent?).merge(file?))
    }

    async fn business_rules(
        &self,
        request: &UnifiedConfigurationRequest,
        correlation: Uuid,
    ) -> Result<ValidationResult, CoordinationError> {
        let (role_rules, cross_rules) = tokio::join!(
            self.guarded(
                ServiceName::Role,
                correlation,
                self.subsystems.roles.validate_business_rules(&request.role)
            ),
            async { self.cross_service_rules(request) },
        );
        Ok(role_rules?.merge(cross_rules))
    }

    async fn security(
        &self,
        request: &UnifiedConfigurationRequest,
        correlation: Uuid,
    ) -> Result<ValidationResult, CoordinationError> {
        let (agent_security, policy) = tokio::join!(
            self.guarded(
                ServiceName::Agent,
                correlation,
                self.subsystems.agents.validate_security(&request.agent)
            ),
            async { self.security_policy(request) },
        );
        Ok(agent_security?.merge(policy))
    }

    async fn dependency(
        &self,
        request: &UnifiedConfigurationRequest,
        existing_agent: Option<Uuid>,
        correlation: Uuid,
    ) -> Result<ValidationResult, CoordinationError> {
        let template_check = async {
            match request.role.template_id {
                Some(template_id) => self
                    .guarded(
                        ServiceName::Role,
                        correlation,
                        self.subsystems.roles.find_by_id(template_id),
                    )
                    .await
                    .map(|found| found.is_none().then_some(template_id)),
                None => Ok(None),
            }
        };
        let name_check = self.guarded(
            ServiceName::Agent,
            correlation,
            self.subsystems.agents.find_by_name(&request.agent.name),
        );
        let (missing_template, same_name) = tokio::join!(template_check, name_check);

        let mut errors = Vec::new();
        if let Some(template_id) = missing_template? {
            errors.push(ValidationIssue::new(
                "role.template_id",
                "TEMPLATE_NOT_FOUND",
                format!(
                    "role template {} does not exist; pick an existing template or clear template_id",
                    template_id
                ),
            ));
        }
        if let Some(other) = same_name? {
            if Some(other.id) != existing_agent {
                errors.push(ValidationIssue::new(
                    "agent.name",
                    "AGENT_NAME_TAKEN",
                    format!(
                        "agent name '{}' is already used by agent {}; choose another name",
                        request.agent.name, other.id
                    ),
                ));
            }
        }
        Ok(ValidationResult::from_errors(errors))
    }

    /// Capability/constraint conflicts, personality-role and model-capability compatibility
    fn cross_service_rules(&self, request: &UnifiedConfigurationRequest) -> ValidationResult {
        let mut errors = Vec::new();
        let constraints: Vec<&str> = request
            .role
            .constraints
            .iter()
            .chain(&request.agent.constraints)
            .map(String::as_str)
            .collect();

        for (field, capability) in capabilities(request) {
            let negation = format!("no_{}", capability);
            if constraints.contains(&negation.as_str()) {
                errors.push(ValidationIssue::new(
                    field,
                    "CAPABILITY_CONSTRAINT_CONFLICT",
                    format!(
                        "capability '{}' conflicts with constraint '{}'; remove capability {} or remove constraint {}",
                        capability, negation, capability, negation
                    ),
                ));
            }

            if let Some(models) = self.policy.model_capabilities.get(capability) {
                let model = &request.agent.model;
                if !models.iter().any(|prefix| model.starts_with(prefix.as_str())) {
                    errors.push(ValidationIssue::new(
                        "agent.model",
                        "MODEL_CAPABILITY_UNSUPPORTED",
                        format!(
                            "model '{}' does not support capability '{}'; use a {} model or remove the capability",
                            model,
                            capability,
                            models.join("/")
                        ),
                    ));
                }
            }
        }

        for requirement in &self.policy.trait_requirements {
            let needed = capabilities(request).any(|(_, c)| c == requirement.capability);
            let value = request.personality.traits.get(&requirement.trait_name);
            if let (true, Some(value)) = (needed, value) {
                if *value < requirement.min {
                    errors.push(ValidationIssue::new(
                        format!("personality.traits.{}", requirement.trait_name),
                        "PERSONALITY_ROLE_INCOMPATIBLE",
                        format!(
                            "capability '{}' needs {} of at least {} but the personality has {}; raise the trait or remove the capability",
                            requirement.capability, requirement.trait_name, requirement.min, value
                        ),
                    ));
                }
            }
        }

        ValidationResult::from_errors(errors)
    }

    /// Forbidden capabilities, bypass detection, data residency and encryption
    fn security_policy(&self, request: &UnifiedConfigurationRequest) -> ValidationResult {
        let mut errors = Vec::new();

        for (field, capability) in capabilities(request) {
            if self.policy.forbidden_capabilities.iter().any(|f| f == capability) {
                errors.push(ValidationIssue::new(
                    field,
                    "FORBIDDEN_CAPABILITY",
                    format!("capability '{}' is not permitted; remove it", capability),
                ));
            }
            if let Some(prefix) = self
                .policy
                .bypass_prefixes
                .iter()
                .find(|p| capability.starts_with(p.as_str()))
            {
                errors.push(ValidationIssue::new(
                    field,
                    "CAPABILITY_BYPASS",
                    format!(
                        "capability '{}' looks like a policy bypass ('{}' prefix); remove it",
                        capability, prefix
                    ),
                ));
            }
        }

        let settings = &request.agent.settings;
        if !self.policy.allowed_regions.is_empty() {
            let region = settings.data_residency.as_deref();
            if !region.is_some_and(|r| self.policy.allowed_regions.iter().any(|a| a == r)) {
                errors.push(ValidationIssue::new(
                    "agent.settings.data_residency",
                    "DATA_RESIDENCY_VIOLATION",
                    format!(
                        "data residency {} is not allowed; set it to one of {}",
                        region.map_or_else(|| "<unset>".to_string(), |r| format!("'{}'", r)),
                        self.policy.allowed_regions.join(", ")
                    ),
                ));
            }
        }

        if self.policy.require_encryption && !settings.encryption_at_rest {
            errors.push(ValidationIssue::new(
                "agent.settings.encryption_at_rest",
                "ENCRYPTION_REQUIRED",
                "encryption at rest is required; set encryption_at_rest to true",
            ));
        }

        ValidationResult::from_errors(errors)
    }
}

/// Role capabilities then agent capabilities, tagged with their field
fn capabilities(request: &UnifiedConfigurationRequest) -> impl Iterator<Item = (&'static str, &str)> {
    request
        .role
        .capabilities
        .iter()
        .map(|c| ("role.capabilities", c.as_str()))
        .chain(
            request
                .agent
                .capabilities
                .iter()
                .map(|c| ("agent.capabilities", c.as_str())),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::LocalSubsystems;
    use crate::application::config::CircuitConfig;
    use tempfile::TempDir;
    use unicfg::{AgentDraft, AgentSettings, Behavior, PersonalityDraft, RoleDraft};

    fn local_stack() -> (TempDir, LocalSubsystems) {
        let dir = TempDir::new().unwrap();
        let stack = LocalSubsystems::new(dir.path());
        (dir, stack)
    }

    fn aggregator(stack: &LocalSubsystems, policy: ValidationPolicy) -> ValidationAggregator {
        ValidationAggregator::new(
            stack.subsystems(),
            Arc::new(CircuitBreakerRegistry::new(CircuitConfig::default())),
            policy,
            TimingBudgets::default(),
        )
    }

    fn request() -> UnifiedConfigurationRequest {
        UnifiedConfigurationRequest::new(
            PersonalityDraft::new("Steady").with_trait("precision", 0.8),
            RoleDraft::new("reviewer").with_capability("code_review"),
            AgentDraft::new("atlas", "gpt-4o"),
        )
    }

    #[tokio::test]
    async fn test_valid_request_passes_every_layer() {
        let (_dir, stack) = local_stack();
        let result = aggregator(&stack, ValidationPolicy::default())
            .validate(&request(), None)
            .await
            .unwrap();
        assert!(result.is_valid, "{}", result.summary());
    }

    #[tokio::test]
    async fn test_capability_constraint_conflict_names_remedy() {
        let (_dir, stack) = local_stack();
        let mut req = request();
        req.role = req.role.with_capability("web_access").with_constraint("no_web_access");

        let result = aggregator(&stack, ValidationPolicy::default())
            .validate(&req, None)
            .await
            .unwrap();

        assert!(!result.is_valid);
        assert_eq!(result.codes(), vec!["CAPABILITY_CONSTRAINT_CONFLICT"]);
        assert!(result.errors[0]
            .message
            .contains("remove capability web_access or remove constraint no_web_access"));
        assert_eq!(result.errors[0].layer, Some(ValidationLayer::BusinessRules));
    }

    #[tokio::test]
    async fn test_schema_failure_stops_before_later_layers() {
        let (_dir, stack) = local_stack();
        let mut req = request();
        req.agent.name = String::new();
        req.agent.capabilities.push("unrestricted_shell".to_string());

        let result = aggregator(&stack, ValidationPolicy::default())
            .validate(&req, None)
            .await
            .unwrap();

        assert!(result
            .errors
            .iter()
            .all(|e| e.layer == Some(ValidationLayer::Schema)));
        assert!(!result.codes().contains(&"FORBIDDEN_CAPABILITY"));
    }

    #[tokio::test]
    async fn test_personality_role_incompatibility() {
        let (_dir, stack) = local_stack();
        let mut req = request();
        req.personality = PersonalityDraft::new("Loose").with_trait("precision", 0.1);

        let result = aggregator(&stack, ValidationPolicy::default())
            .validate(&req, None)
            .await
            .unwrap();
        assert_eq!(result.codes(), vec!["PERSONALITY_ROLE_INCOMPATIBLE"]);
    }

    #[tokio::test]
    async fn test_model_capability_mismatch() {
        let (_dir, stack) = local_stack();
        let mut req = request();
        req.agent = AgentDraft::new("atlas", "small-local-model").with_capability("vision");

        let result = aggregator(&stack, ValidationPolicy::default())
            .validate(&req, None)
            .await
            .unwrap();
        assert_eq!(result.codes(), vec!["MODEL_CAPABILITY_UNSUPPORTED"]);
    }

    #[tokio::test]
    async fn test_security_layer_aggregates_all_issues() {
        let (_dir, stack) = local_stack();
        let mut req = request();
        req.agent = AgentDraft::new("atlas", "gpt-4o")
            .with_capability("bypass_content_filter")
            .with_capability("credential_access")
            .with_settings(AgentSettings {
                data_residency: Some("mars".to_string()),
                encryption_at_rest: false,
                ..Default::default()
            });

        let policy = ValidationPolicy::default().with_allowed_regions(&["eu", "us"]);
        let result = aggregator(&stack, policy).validate(&req, None).await.unwrap();

        let codes = result.codes();
        assert!(codes.contains(&"CAPABILITY_BYPASS"));
        assert!(codes.contains(&"FORBIDDEN_CAPABILITY"));
        assert!(codes.contains(&"DATA_RESIDENCY_VIOLATION"));
        assert!(codes.contains(&"ENCRYPTION_REQUIRED"));
        assert!(result
            .errors
            .iter()
            .all(|e| e.layer == Some(ValidationLayer::Security)));
    }

    #[tokio::test]
    async fn test_dependency_layer_detects_missing_template() {
        let (_dir, stack) = local_stack();
        let mut req = request();
        req.role = req.role.with_template(Uuid::new_v4());

        let result = aggregator(&stack, ValidationPolicy::default())
            .validate(&req, None)
            .await
            .unwrap();
        assert_eq!(result.codes(), vec!["TEMPLATE_NOT_FOUND"]);
    }

    #[tokio::test]
    async fn test_slow_layer_reports_timeout() {
        let (_dir, stack) = local_stack();
        stack.roles.faults().set(
            Operation::Validate,
            Behavior::delay_then(150, Behavior::Succeed),
        );
        let validator = ValidationAggregator::new(
            stack.subsystems(),
            Arc::new(CircuitBreakerRegistry::new(CircuitConfig::default())),
            ValidationPolicy::default(),
            TimingBudgets {
                validation_layer_ms: 50,
                ..Default::default()
            },
        );

        let result = validator.validate(&request(), None).await.unwrap();
        assert_eq!(result.codes(), vec!["VALIDATION_TIMEOUT"]);
        assert_eq!(result.errors[0].field, "schema");
    }
}
