//! Unified configuration request/response DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use unicfg::{
    Agent, AgentDraft, AgentPatch, ConsistencyReport, ConsistencyViolation, CustomRole,
    DomainError, PersonalityConfiguration, PersonalityDraft, PersonalityPatch, RoleDraft,
    RolePatch, UnifiedConfiguration, UnifiedConfigurationRequest, UnifiedConfigurationUpdate,
    ValidationIssue, ValidationResult,
};

use crate::application::ConsistencyOutcome;

// ============================================
// Request DTOs
// ============================================

/// Create unified configuration request
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateConfigurationRequest {
    #[schema(value_type = Object)]
    pub personality: PersonalityDraft,
    #[schema(value_type = Object)]
    pub role: RoleDraft,
    #[schema(value_type = Object)]
    pub agent: AgentDraft,
}

impl From<CreateConfigurationRequest> for UnifiedConfigurationRequest {
    fn from(req: CreateConfigurationRequest) -> Self {
        UnifiedConfigurationRequest::new(req.personality, req.role, req.agent)
    }
}

/// Batch create request; each entry is its own unit of work
#[derive(Debug, Deserialize, ToSchema)]
pub struct BatchCreateRequest {
    pub configurations: Vec<CreateConfigurationRequest>,
}

/// Partial update; omitted sections are left untouched
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateConfigurationRequest {
    /// Aggregate version the caller read
    pub expected_version: Option<u64>,
    /// When the caller made the change; defaults to arrival time
    pub timestamp: Option<DateTime<Utc>>,
    #[schema(value_type = Option<Object>)]
    pub personality: Option<PersonalityPatch>,
    #[schema(value_type = Option<Object>)]
    pub role: Option<RolePatch>,
    #[schema(value_type = Option<Object>)]
    pub agent: Option<AgentPatch>,
}

impl From<UpdateConfigurationRequest> for UnifiedConfigurationUpdate {
    fn from(req: UpdateConfigurationRequest) -> Self {
        UnifiedConfigurationUpdate {
            expected_version: req.expected_version,
            timestamp: req.timestamp,
            personality: req.personality,
            role: req.role,
            // Role renames are propagated by the coordinator, not the caller
            agent: req.agent.map(|patch| AgentPatch {
                role_name: None,
                ..patch
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ConsistencyQuery {
    /// Poll until consistent or the consistency window elapses
    #[serde(default)]
    pub wait: bool,
}

// ============================================
// Response DTOs
// ============================================

/// Unified configuration response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConfigurationResponse {
    pub agent_id: Uuid,
    pub version: u64,
    pub is_active: bool,
    /// SHA-256 of the rendered configuration
    pub checksum: String,
    #[schema(value_type = Object)]
    pub personality: PersonalityConfiguration,
    #[schema(value_type = Object)]
    pub role: CustomRole,
    #[schema(value_type = Object)]
    pub agent: Agent,
}

impl TryFrom<UnifiedConfiguration> for ConfigurationResponse {
    type Error = DomainError;

    fn try_from(config: UnifiedConfiguration) -> Result<Self, Self::Error> {
        Ok(Self {
            agent_id: config.agent_id(),
            version: config.version(),
            is_active: config.agent.metadata.is_active,
            checksum: config.checksum()?,
            personality: config.personality,
            role: config.role,
            agent: config.agent,
        })
    }
}

/// Outcome of one entry of a batch create
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchItemResult {
    /// HTTP status the entry would have produced on its own
    pub status: u16,
    pub configuration: Option<ConfigurationResponse>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchCreateResponse {
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<BatchItemResult>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ValidationResponse {
    pub is_valid: bool,
    #[schema(value_type = Vec<Object>)]
    pub errors: Vec<ValidationIssue>,
}

impl From<ValidationResult> for ValidationResponse {
    fn from(result: ValidationResult) -> Self {
        Self {
            is_valid: result.is_valid,
            errors: result.errors,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConsistencyResponse {
    pub agent_id: Uuid,
    pub is_consistent: bool,
    /// False when a wait ran out before the subsystems converged
    pub settled: bool,
    #[schema(value_type = Vec<Object>)]
    pub violations: Vec<ConsistencyViolation>,
}

impl ConsistencyResponse {
    pub fn new(agent_id: Uuid, report: ConsistencyReport) -> Self {
        Self {
            agent_id,
            is_consistent: report.is_consistent,
            settled: true,
            violations: report.violations,
        }
    }
}

impl From<(Uuid, ConsistencyOutcome)> for ConsistencyResponse {
    fn from((agent_id, outcome): (Uuid, ConsistencyOutcome)) -> Self {
        match outcome {
            ConsistencyOutcome::Consistent(report) => Self::new(agent_id, report),
            ConsistencyOutcome::NotYetConsistent(report) => Self {
                settled: false,
                ..Self::new(agent_id, report)
            },
        }
    }
}
