//! Operational Routes - Recovery, workflow journal and circuit state

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use super::error_response;
use crate::models::{
    CircuitStatsResponse, RollbackRequest, RollbackResponse, WorkflowSummary, WorkflowsQuery,
};
use crate::AppState;

const DEFAULT_WORKFLOW_LIMIT: usize = 50;

/// Re-run pending compensation for a failed workflow
#[utoipa::path(
    post,
    path = "/unicfg/recovery/rollback",
    request_body = RollbackRequest,
    responses(
        (status = 200, description = "Recovery outcome", body = RollbackResponse),
        (status = 404, description = "No workflow recorded for the transaction"),
        (status = 502, description = "Compensation failed again")
    ),
    tag = "Operations"
)]
pub async fn rollback(
    State(state): State<AppState>,
    Json(payload): Json<RollbackRequest>,
) -> Result<Json<RollbackResponse>, (StatusCode, String)> {
    let recovered = state
        .service
        .rollback_configuration(payload.transaction_id)
        .await
        .map_err(error_response)?;

    if let Some(workflow) = &recovered {
        tracing::info!(
            transaction_id = %workflow.transaction_id,
            status = ?workflow.status,
            "Recovered workflow"
        );
    }
    Ok(Json(recovered.into()))
}

/// Recently finished workflows, newest first
#[utoipa::path(
    get,
    path = "/unicfg/workflows",
    params(WorkflowsQuery),
    responses(
        (status = 200, description = "Workflow journal", body = Vec<WorkflowSummary>)
    ),
    tag = "Operations"
)]
pub async fn list_workflows(
    State(state): State<AppState>,
    Query(query): Query<WorkflowsQuery>,
) -> Json<Vec<WorkflowSummary>> {
    let limit = query.limit.unwrap_or(DEFAULT_WORKFLOW_LIMIT);
    Json(
        state
            .service
            .recent_workflows(limit)
            .into_iter()
            .map(WorkflowSummary::from)
            .collect(),
    )
}

/// Circuit breaker state per subsystem
#[utoipa::path(
    get,
    path = "/unicfg/circuits",
    responses(
        (status = 200, description = "Circuit breaker stats", body = Vec<CircuitStatsResponse>)
    ),
    tag = "Operations"
)]
pub async fn list_circuits(State(state): State<AppState>) -> Json<Vec<CircuitStatsResponse>> {
    Json(
        state
            .service
            .circuit_stats()
            .into_iter()
            .map(CircuitStatsResponse::from)
            .collect(),
    )
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/unicfg/recovery/rollback", post(rollback))
        .route("/unicfg/workflows", get(list_workflows))
        .route("/unicfg/circuits", get(list_circuits))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testing::{send, test_app, valid_payload};
    use axum::http::Method;
    use serde_json::json;
    use unicfg::{Behavior, Operation};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_failed_create_appears_in_journal_then_recovers() {
        let app = test_app();
        app.local
            .roles
            .faults()
            .set(Operation::Create, Behavior::fail_with("role store offline"));
        app.local
            .personalities
            .faults()
            .set(Operation::Rollback, Behavior::fail_with("personality store offline"));

        let (status, _) = send(
            &app.router,
            Method::POST,
            "/unicfg/configurations",
            Some(valid_payload("atlas")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(app.local.personalities.len(), 1);

        let (status, workflows) = send(&app.router, Method::GET, "/unicfg/workflows", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(workflows[0]["status"], "failed");
        assert_eq!(workflows[0]["failed"], json!(["role"]));
        let transaction_id = workflows[0]["transaction_id"].clone();

        app.local.personalities.faults().clear();
        let (status, body) = send(
            &app.router,
            Method::POST,
            "/unicfg/recovery/rollback",
            Some(json!({ "transaction_id": transaction_id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["recovered"], true);
        assert_eq!(body["workflow"]["status"], "rolled_back");
        assert!(app.local.personalities.is_empty());
    }

    #[tokio::test]
    async fn test_rollback_with_nothing_to_recover() {
        let app = test_app();
        let (status, body) = send(
            &app.router,
            Method::POST,
            "/unicfg/recovery/rollback",
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["recovered"], false);

        let (status, _) = send(
            &app.router,
            Method::POST,
            "/unicfg/recovery/rollback",
            Some(json!({ "transaction_id": Uuid::new_v4() })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_circuits_list_every_subsystem() {
        let app = test_app();
        send(
            &app.router,
            Method::POST,
            "/unicfg/configurations",
            Some(valid_payload("atlas")),
        )
        .await;

        let (status, body) = send(&app.router, Method::GET, "/unicfg/circuits", None).await;
        assert_eq!(status, StatusCode::OK);
        let circuits = body.as_array().unwrap();
        assert_eq!(circuits.len(), 4);
        assert!(circuits.iter().all(|c| c["state"] == "closed"));
    }
}
