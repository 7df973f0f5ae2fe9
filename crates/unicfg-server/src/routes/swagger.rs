//! OpenAPI Documentation
//!
//! Centralized API documentation using utoipa.

use utoipa::OpenApi;

use crate::models::{
    BatchCreateRequest,
    BatchCreateResponse,
    BatchItemResult,
    // Operations models
    CircuitStatsResponse,
    // Configuration models
    ConfigurationResponse,
    ConsistencyResponse,
    CreateConfigurationRequest,
    RollbackRequest,
    RollbackResponse,
    UpdateConfigurationRequest,
    ValidationResponse,
    WorkflowSummary,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        // Configuration endpoints
        super::configurations::list_configurations,
        super::configurations::create_configuration,
        super::configurations::batch_create_configurations,
        super::configurations::validate_configuration,
        super::configurations::get_configuration,
        super::configurations::update_configuration,
        super::configurations::delete_configuration,
        super::configurations::archive_configuration,
        super::configurations::get_consistency,
        // Operations endpoints
        super::operations::rollback,
        super::operations::list_workflows,
        super::operations::list_circuits,
    ),
    info(
        title = "Unicfg API",
        version = "0.1.0",
        description = "Unified configuration coordination\n\nCreates, updates and retires an agent's personality, role, agent record and rendered configuration file as one unit of work.",
        license(name = "MIT"),
    ),
    servers(
        (url = "/", description = "Current server"),
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Configuration", description = "Unified configuration lifecycle"),
        (name = "Operations", description = "Recovery, workflow journal and circuit breakers"),
    ),
    components(
        schemas(
            // Configuration
            CreateConfigurationRequest,
            BatchCreateRequest,
            UpdateConfigurationRequest,
            ConfigurationResponse,
            BatchItemResult,
            BatchCreateResponse,
            ValidationResponse,
            ConsistencyResponse,
            // Operations
            RollbackRequest,
            RollbackResponse,
            WorkflowSummary,
            CircuitStatsResponse,
        )
    )
)]
pub struct ApiDoc;
