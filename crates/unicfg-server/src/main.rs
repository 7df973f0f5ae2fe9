use axum::{middleware, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod adapters;
mod application;
mod auth;
mod config;
mod models;
mod routes;

use adapters::{LocalSubsystems, TracingObserver};
use application::UnifiedConfigurationService;
use config::ServerConfig;

/// Application state shared across all routes
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<UnifiedConfigurationService>,
}

#[derive(Serialize)]
struct HealthCheck {
    status: String,
    message: String,
    version: String,
}

async fn health_check() -> Json<HealthCheck> {
    Json(HealthCheck {
        status: "ok".to_string(),
        message: "Unicfg API is running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Assemble the full router: health, docs and the authenticated API
pub fn build_router(state: AppState) -> Router {
    // Protected routes (require authentication)
    let protected_routes = Router::new()
        .merge(routes::configurations::router())
        .merge(routes::operations::router())
        .layer(middleware::from_fn(auth::auth_middleware));

    let openapi = routes::swagger::ApiDoc::openapi();

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
        .route("/health", get(health_check))
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("unicfg=info,unicfg_server=info,tower_http=info")),
        )
        .init();

    let config = ServerConfig::load()?;

    match config.api_key.clone() {
        Some(key) => {
            auth::init_api_key(key);
            tracing::info!("API key authentication enabled");
        }
        None => tracing::warn!("No UNICFG_API_KEY set - authentication disabled"),
    }

    let local = LocalSubsystems::new(&config.artifact_dir);
    tracing::info!(
        artifact_dir = %local.files.root().display(),
        conflict_strategy = %config.coordinator.conflict_strategy,
        strict_versioning = config.coordinator.strict_versioning,
        "Subsystems initialized"
    );

    let service = UnifiedConfigurationService::new(
        local.subsystems(),
        Arc::new(TracingObserver),
        config.coordinator.clone(),
    );
    let state = AppState {
        service: Arc::new(service),
    };

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("Swagger UI: /swagger-ui");
    tracing::info!("Unicfg API listening on {}", config.bind_addr);

    axum::serve(listener, router).await?;
    Ok(())
}
