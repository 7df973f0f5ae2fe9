//! Unified Configuration Routes
//!
//! HTTP handlers that delegate to UnifiedConfigurationService.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use unicfg::{UnifiedConfiguration, UnifiedConfigurationRequest};

use super::error_response;
use crate::models::{
    BatchCreateRequest, BatchCreateResponse, BatchItemResult, ConfigurationResponse,
    ConsistencyQuery, ConsistencyResponse, CreateConfigurationRequest,
    UpdateConfigurationRequest, ValidationResponse,
};
use crate::AppState;

fn to_response(
    config: UnifiedConfiguration,
) -> Result<ConfigurationResponse, (StatusCode, String)> {
    ConfigurationResponse::try_from(config)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// List all unified configurations
#[utoipa::path(
    get,
    path = "/unicfg/configurations",
    responses(
        (status = 200, description = "List of all configurations", body = Vec<ConfigurationResponse>),
        (status = 502, description = "A subsystem failed")
    ),
    tag = "Configuration"
)]
pub async fn list_configurations(
    State(state): State<AppState>,
) -> Result<Json<Vec<ConfigurationResponse>>, (StatusCode, String)> {
    let configs = state
        .service
        .list_unified_configurations()
        .await
        .map_err(error_response)?;

    let responses = configs
        .into_iter()
        .map(to_response)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(responses))
}

/// Create a unified configuration
#[utoipa::path(
    post,
    path = "/unicfg/configurations",
    request_body = CreateConfigurationRequest,
    responses(
        (status = 200, description = "Configuration created", body = ConfigurationResponse),
        (status = 422, description = "Validation failed"),
        (status = 502, description = "A subsystem failed; completed steps were rolled back"),
        (status = 503, description = "Circuit open for a subsystem")
    ),
    tag = "Configuration"
)]
pub async fn create_configuration(
    State(state): State<AppState>,
    Json(payload): Json<CreateConfigurationRequest>,
) -> Result<Json<ConfigurationResponse>, (StatusCode, String)> {
    let request = UnifiedConfigurationRequest::from(payload);
    let config = state
        .service
        .create_unified_configuration(&request)
        .await
        .map_err(error_response)?;

    Ok(Json(to_response(config)?))
}

/// Create several configurations; each entry succeeds or fails on its own
#[utoipa::path(
    post,
    path = "/unicfg/configurations/batch",
    request_body = BatchCreateRequest,
    responses(
        (status = 200, description = "Per-entry outcomes", body = BatchCreateResponse)
    ),
    tag = "Configuration"
)]
pub async fn batch_create_configurations(
    State(state): State<AppState>,
    Json(payload): Json<BatchCreateRequest>,
) -> Result<Json<BatchCreateResponse>, (StatusCode, String)> {
    let requests: Vec<UnifiedConfigurationRequest> = payload
        .configurations
        .into_iter()
        .map(UnifiedConfigurationRequest::from)
        .collect();

    let mut results = Vec::with_capacity(requests.len());
    for outcome in state.service.create_many(&requests).await {
        let item = match outcome.map_err(error_response).and_then(to_response) {
            Ok(configuration) => BatchItemResult {
                status: StatusCode::OK.as_u16(),
                configuration: Some(configuration),
                error: None,
            },
            Err((status, message)) => BatchItemResult {
                status: status.as_u16(),
                configuration: None,
                error: Some(message),
            },
        };
        results.push(item);
    }

    let succeeded = results.iter().filter(|r| r.error.is_none()).count();
    Ok(Json(BatchCreateResponse {
        succeeded,
        failed: results.len() - succeeded,
        results,
    }))
}

/// Validate a configuration without creating anything
#[utoipa::path(
    post,
    path = "/unicfg/configurations/validate",
    request_body = CreateConfigurationRequest,
    responses(
        (status = 200, description = "Validation outcome, valid or not", body = ValidationResponse),
        (status = 503, description = "Circuit open for a subsystem")
    ),
    tag = "Configuration"
)]
pub async fn validate_configuration(
    State(state): State<AppState>,
    Json(payload): Json<CreateConfigurationRequest>,
) -> Result<Json<ValidationResponse>, (StatusCode, String)> {
    let request = UnifiedConfigurationRequest::from(payload);
    let result = state
        .service
        .validate_unified_configuration(&request)
        .await
        .map_err(error_response)?;

    Ok(Json(result.into()))
}

/// Get a configuration by agent ID
#[utoipa::path(
    get,
    path = "/unicfg/configurations/{id}",
    params(
        ("id" = Uuid, Path, description = "Agent ID")
    ),
    responses(
        (status = 200, description = "Configuration found", body = ConfigurationResponse),
        (status = 404, description = "Configuration not found"),
        (status = 500, description = "Stored parts reference each other inconsistently")
    ),
    tag = "Configuration"
)]
pub async fn get_configuration(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConfigurationResponse>, (StatusCode, String)> {
    let config = state
        .service
        .get_unified_configuration(id)
        .await
        .map_err(error_response)?
        .ok_or((
            StatusCode::NOT_FOUND,
            "Configuration not found".to_string(),
        ))?;

    Ok(Json(to_response(config)?))
}

/// Partially update a configuration
#[utoipa::path(
    patch,
    path = "/unicfg/configurations/{id}",
    params(
        ("id" = Uuid, Path, description = "Agent ID")
    ),
    request_body = UpdateConfigurationRequest,
    responses(
        (status = 200, description = "Configuration after the update", body = ConfigurationResponse),
        (status = 404, description = "Configuration not found"),
        (status = 409, description = "Version conflict or unfinished rollback"),
        (status = 422, description = "Validation failed"),
        (status = 502, description = "A subsystem failed; changes were reverted")
    ),
    tag = "Configuration"
)]
pub async fn update_configuration(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateConfigurationRequest>,
) -> Result<Json<ConfigurationResponse>, (StatusCode, String)> {
    let config = state
        .service
        .update_unified_configuration(id, payload.into())
        .await
        .map_err(error_response)?;

    Ok(Json(to_response(config)?))
}

/// Delete a configuration and all of its parts
#[utoipa::path(
    delete,
    path = "/unicfg/configurations/{id}",
    params(
        ("id" = Uuid, Path, description = "Agent ID")
    ),
    responses(
        (status = 200, description = "Configuration deleted"),
        (status = 404, description = "Configuration not found"),
        (status = 409, description = "Active dependents or an unfinished rollback block the delete")
    ),
    tag = "Configuration"
)]
pub async fn delete_configuration(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    state
        .service
        .delete_unified_configuration(id)
        .await
        .map_err(error_response)?;

    Ok(Json(serde_json::json!({
        "status": "ok",
        "message": "Configuration deleted"
    })))
}

/// Archive a configuration, keeping every part and reference
#[utoipa::path(
    post,
    path = "/unicfg/configurations/{id}/archive",
    params(
        ("id" = Uuid, Path, description = "Agent ID")
    ),
    responses(
        (status = 200, description = "Archived configuration", body = ConfigurationResponse),
        (status = 404, description = "Configuration not found"),
        (status = 409, description = "Unfinished rollback must be recovered first")
    ),
    tag = "Configuration"
)]
pub async fn archive_configuration(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConfigurationResponse>, (StatusCode, String)> {
    let config = state
        .service
        .archive_unified_configuration(id)
        .await
        .map_err(error_response)?;

    Ok(Json(to_response(config)?))
}

/// Cross-subsystem consistency report
#[utoipa::path(
    get,
    path = "/unicfg/configurations/{id}/consistency",
    params(
        ("id" = Uuid, Path, description = "Agent ID"),
        ConsistencyQuery
    ),
    responses(
        (status = 200, description = "Consistency report", body = ConsistencyResponse),
        (status = 404, description = "Configuration not found")
    ),
    tag = "Configuration"
)]
pub async fn get_consistency(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ConsistencyQuery>,
) -> Result<Json<ConsistencyResponse>, (StatusCode, String)> {
    let response = if query.wait {
        let outcome = state
            .service
            .await_consistency(id)
            .await
            .map_err(error_response)?;
        ConsistencyResponse::from((id, outcome))
    } else {
        let report = state
            .service
            .verify_consistency(id)
            .await
            .map_err(error_response)?;
        ConsistencyResponse::new(id, report)
    };

    Ok(Json(response))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/unicfg/configurations",
            get(list_configurations).post(create_configuration),
        )
        .route(
            "/unicfg/configurations/batch",
            post(batch_create_configurations),
        )
        .route(
            "/unicfg/configurations/validate",
            post(validate_configuration),
        )
        .route(
            "/unicfg/configurations/:id",
            get(get_configuration)
                .patch(update_configuration)
                .delete(delete_configuration),
        )
        .route(
            "/unicfg/configurations/:id/archive",
            post(archive_configuration),
        )
        .route(
            "/unicfg/configurations/:id/consistency",
            get(get_consistency),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testing::{send, test_app, valid_payload};
    use axum::http::Method;
    use serde_json::json;
    use unicfg::{Behavior, Dependent, DependentKind, Operation};

    #[tokio::test]
    async fn test_create_then_get() {
        let app = test_app();

        let (status, created) = send(
            &app.router,
            Method::POST,
            "/unicfg/configurations",
            Some(valid_payload("atlas")),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", created);
        let agent_id = created["agent_id"].as_str().unwrap().to_string();
        assert_eq!(created["version"], 1);
        assert_eq!(created["agent"]["personality_id"], created["personality"]["id"]);

        let (status, fetched) = send(
            &app.router,
            Method::GET,
            &format!("/unicfg/configurations/{}", agent_id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["checksum"], created["checksum"]);
    }

    #[tokio::test]
    async fn test_get_unknown_is_404() {
        let app = test_app();
        let (status, _) = send(
            &app.router,
            Method::GET,
            &format!("/unicfg/configurations/{}", Uuid::new_v4()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_create_is_422_and_creates_nothing() {
        let app = test_app();
        let mut payload = valid_payload("atlas");
        payload["agent"]["settings"] = json!({ "temperature": 3.5, "max_tokens": 1024 });

        let (status, body) = send(
            &app.router,
            Method::POST,
            "/unicfg/configurations",
            Some(payload),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body.as_str().unwrap().contains("temperature"));
        assert!(app.local.personalities.is_empty());
    }

    #[tokio::test]
    async fn test_role_failure_is_502_naming_role() {
        let app = test_app();
        app.local
            .roles
            .faults()
            .set(Operation::Create, Behavior::fail_with("role store offline"));

        let (status, body) = send(
            &app.router,
            Method::POST,
            "/unicfg/configurations",
            Some(valid_payload("atlas")),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body.as_str().unwrap().contains("Role"));
        assert!(app.local.personalities.is_empty());
    }

    #[tokio::test]
    async fn test_validate_reports_without_mutation() {
        let app = test_app();
        let mut payload = valid_payload("atlas");
        payload["role"]["capabilities"] = json!(["bypass_review"]);

        let (status, body) = send(
            &app.router,
            Method::POST,
            "/unicfg/configurations/validate",
            Some(payload),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_valid"], false);
        assert!(!body["errors"].as_array().unwrap().is_empty());
        assert!(app.local.roles.is_empty());
    }

    #[tokio::test]
    async fn test_batch_reports_each_entry() {
        let app = test_app();
        let mut invalid = valid_payload("broken");
        invalid["agent"]["model"] = json!("");

        let (status, body) = send(
            &app.router,
            Method::POST,
            "/unicfg/configurations/batch",
            Some(json!({
                "configurations": [valid_payload("one"), invalid, valid_payload("two")]
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["succeeded"], 2);
        assert_eq!(body["failed"], 1);
        assert_eq!(body["results"][1]["status"], 422);
        assert_eq!(app.local.agents.len(), 2);
    }

    #[tokio::test]
    async fn test_patch_bumps_version_and_stale_strict_is_409() {
        let app = test_app_strict();
        let (_, created) = send(
            &app.router,
            Method::POST,
            "/unicfg/configurations",
            Some(valid_payload("atlas")),
        )
        .await;
        let uri = format!(
            "/unicfg/configurations/{}",
            created["agent_id"].as_str().unwrap()
        );

        let (status, updated) = send(
            &app.router,
            Method::PATCH,
            &uri,
            Some(json!({ "expected_version": 1, "agent": { "model": "gpt-4o-mini" } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", updated);
        assert_eq!(updated["version"], 2);
        assert_eq!(updated["agent"]["model"], "gpt-4o-mini");

        let (status, _) = send(
            &app.router,
            Method::PATCH,
            &uri,
            Some(json!({ "expected_version": 1, "agent": { "model": "gpt-4o" } })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    fn test_app_strict() -> crate::routes::testing::TestApp {
        crate::routes::testing::test_app_with(
            crate::application::CoordinatorConfig::default().with_strict_versioning(true),
        )
    }

    #[tokio::test]
    async fn test_delete_blocked_by_dependents_then_allowed() {
        let app = test_app();
        let (_, created) = send(
            &app.router,
            Method::POST,
            "/unicfg/configurations",
            Some(valid_payload("atlas")),
        )
        .await;
        let agent_id: Uuid = created["agent_id"].as_str().unwrap().parse().unwrap();
        let uri = format!("/unicfg/configurations/{}", agent_id);

        app.local.dependents.set(
            agent_id,
            vec![Dependent::new(DependentKind::ActiveConversation, 3)],
        );
        let (status, body) = send(&app.router, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body.as_str().unwrap().contains("3 active conversations"));

        app.local.dependents.clear(agent_id);
        let (status, _) = send(&app.router, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app.router, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_archive_then_consistency() {
        let app = test_app();
        let (_, created) = send(
            &app.router,
            Method::POST,
            "/unicfg/configurations",
            Some(valid_payload("atlas")),
        )
        .await;
        let agent_id = created["agent_id"].as_str().unwrap();

        let (status, archived) = send(
            &app.router,
            Method::POST,
            &format!("/unicfg/configurations/{}/archive", agent_id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(archived["is_active"], false);
        assert_eq!(archived["agent"]["role_id"], created["role"]["id"]);

        let (status, report) = send(
            &app.router,
            Method::GET,
            &format!("/unicfg/configurations/{}/consistency?wait=true", agent_id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["is_consistent"], true);
        assert_eq!(report["settled"], true);
    }
}
