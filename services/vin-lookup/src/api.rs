use crate::config::ApiConfig;
use crate::export::{export_records, ExportFormat};
use crate::lookup::{LookupError, LookupOrchestrator, Resolution};
use crate::record_store::RecordStore;
use crate::vin::{VinNumber, VinRecord};
use anyhow::{Context, Result};
use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<LookupOrchestrator>,
    pub store: Arc<dyn RecordStore>,
    pub service_name: String,
}

/// Lookup response: the record plus whether it came from the cache
#[derive(Debug, Serialize)]
pub struct LookupResponse {
    #[serde(flatten)]
    pub record: VinRecord,
    pub cached: bool,
}

impl From<Resolution> for LookupResponse {
    fn from(resolution: Resolution) -> Self {
        Self {
            record: resolution.record,
            cached: resolution.cached,
        }
    }
}

/// List response
#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub vins: Vec<VinRecord>,
}

/// Remove response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveResponse {
    pub vin_number: VinNumber,
    pub cache_delete_success: bool,
}

/// Query parameters for export
#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub export_format: ExportFormat,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.to_string(),
        }),
    )
}

impl From<LookupError> for ApiError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::InvalidFormat(e) => {
                api_error(StatusCode::BAD_REQUEST, "INVALID_FORMAT", e.to_string())
            }
            LookupError::VinNotFound(vin) => api_error(
                StatusCode::NOT_FOUND,
                "VIN_NOT_FOUND",
                format!("VIN {vin} not found"),
            ),
            e @ LookupError::UpstreamUnavailable { .. } => {
                api_error(StatusCode::SERVICE_UNAVAILABLE, "UPSTREAM_UNAVAILABLE", e.to_string())
            }
            LookupError::Unexpected(message) => {
                error!(error = %message, "Unexpected lookup failure");
                api_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
            }
        }
    }
}

/// Unparseable path segments are treated as malformed VINs
fn path_rejection(rejection: PathRejection) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "INVALID_FORMAT", rejection.body_text())
}

/// The only query parameter is `export_format`, so a rejection means an unknown format
fn query_rejection(rejection: QueryRejection) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "UNSUPPORTED_FORMAT", rejection.body_text())
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<HeaderValue> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/lookup/:vin", get(lookup_vin))
        .route("/list", get(list_vins))
        .route("/remove/:vin", delete(remove_vin))
        .route("/export", get(export_vins))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": state.service_name
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

/// Resolve a VIN, cache first
#[instrument(skip(state))]
async fn lookup_vin(
    State(state): State<AppState>,
    vin: Result<Path<String>, PathRejection>,
) -> Result<Json<LookupResponse>, ApiError> {
    let Path(vin) = vin.map_err(path_rejection)?;
    let resolution = state.orchestrator.resolve(&vin).await?;
    Ok(Json(resolution.into()))
}

/// List every cached record
#[instrument(skip(state))]
async fn list_vins(State(state): State<AppState>) -> Result<Json<ListResponse>, ApiError> {
    let vins = state.orchestrator.list().await?;
    Ok(Json(ListResponse { vins }))
}

/// Remove a VIN from the cache
#[instrument(skip(state))]
async fn remove_vin(
    State(state): State<AppState>,
    vin: Result<Path<String>, PathRejection>,
) -> Result<Json<RemoveResponse>, ApiError> {
    let Path(vin) = vin.map_err(path_rejection)?;
    let (vin_number, cache_delete_success) = state.orchestrator.remove(&vin).await?;
    Ok(Json(RemoveResponse {
        vin_number,
        cache_delete_success,
    }))
}

/// Download every cached record as a file
#[instrument(skip(state))]
async fn export_vins(
    State(state): State<AppState>,
    params: Result<Query<ExportQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = params.map_err(query_rejection)?;
    let format = params.export_format;
    let vins = state.orchestrator.list().await?;

    let body = export_records(&vins, format).map_err(|e| {
        error!(error = %e, format = %format, "Failed to export records");
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "Failed to export records",
        )
    })?;

    let disposition = format!("attachment; filename=\"vins_cache.{}\"", format.extension());

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

/// Start the lookup API server
pub async fn start_api_server(state: AppState, config: &ApiConfig) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting VIN lookup API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}
