//! # Server Configuration
//!
//! Router assembly and server startup for the probe ingestion API.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::handlers;
use crate::ingest::IngestionService;
use crate::telemetry;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseConnection>,
    pub ingestion: Arc<IngestionService>,
    /// Cancelled when the server begins shutting down.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: AppConfig, db: DatabaseConnection) -> Self {
        let db = Arc::new(db);
        let ingestion = Arc::new(IngestionService::new(db.clone(), &config.ingest));
        Self {
            config: Arc::new(config),
            db,
            ingestion,
            shutdown: CancellationToken::new(),
        }
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let max_payload = state.config.ingest.max_payload_bytes();

    Router::new()
        .route("/", get(handlers::root))
        .route("/api/health", get(handlers::health))
        .route(
            "/api/probe/data",
            post(handlers::ingest::receive_probe_data).layer(DefaultBodyLimit::max(max_payload)),
        )
        .route("/api/v1/customers", get(handlers::hierarchy::list_customers))
        .route(
            "/api/v1/customers/{customer_id}/sites",
            get(handlers::hierarchy::list_sites),
        )
        .route(
            "/api/v1/sites/{site_id}/probes",
            get(handlers::hierarchy::list_probes),
        )
        .route(
            "/api/v1/probes/{address}/measurements",
            get(handlers::hierarchy::list_measurements),
        )
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(telemetry::trace_context_middleware))
}

/// Starts the server with the given configuration
pub async fn run_server(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<()> {
    let addr = config
        .bind_addr()
        .with_context(|| format!("Invalid server address: {}", config.api_bind_addr))?;
    let profile = config.profile.clone();

    let state = AppState::new(config, db);
    let shutdown = state.shutdown.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(%addr, %profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown requested; finishing in-flight batches");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health,
        crate::handlers::ingest::receive_probe_data,
        crate::handlers::hierarchy::list_customers,
        crate::handlers::hierarchy::list_sites,
        crate::handlers::hierarchy::list_probes,
        crate::handlers::hierarchy::list_measurements,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::HealthResponse,
            crate::error::ApiError,
            crate::ingest::BatchResult,
            crate::ingest::EntryOutcome,
            crate::ingest::EntryStatus,
            crate::ingest::FieldError,
            crate::ingest::ReasonCode,
            crate::status::AlarmState,
            crate::status::Connectivity,
            crate::handlers::hierarchy::CustomersResponse,
            crate::handlers::hierarchy::CustomerDto,
            crate::handlers::hierarchy::SitesResponse,
            crate::handlers::hierarchy::SiteDto,
            crate::handlers::hierarchy::ProbesResponse,
            crate::handlers::hierarchy::ProbeStatusDto,
            crate::handlers::hierarchy::LatestReadingDto,
            crate::handlers::hierarchy::MeasurementsResponse,
            crate::handlers::hierarchy::MeasurementDto,
        )
    ),
    tags(
        (name = "root", description = "Service information and health"),
        (name = "ingest", description = "Probe batch ingestion"),
        (name = "hierarchy", description = "Customer, site, probe and history queries"),
    ),
    info(
        title = "Probe Ingest API",
        description = "Ingestion and query API for tank-probe telemetry",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
