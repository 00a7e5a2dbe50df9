//! HTTP API for health checks, Prometheus metrics, clusters and pricing

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use cost_lib::{
    cloud::Provider,
    clusters::ClusterMap,
    health::{ComponentStatus, HealthRegistry},
    observability::{CostModelMetrics, StructuredLogger},
    PricingError,
};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: CostModelMetrics,
    pub registry: Registry,
    pub cluster_map: Arc<dyn ClusterMap>,
    pub provider: Arc<dyn Provider>,
    pub logger: StructuredLogger,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: CostModelMetrics,
        registry: Registry,
        cluster_map: Arc<dyn ClusterMap>,
        provider: Arc<dyn Provider>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            registry,
            cluster_map,
            provider,
            logger,
        }
    }
}

/// Health check response - returns 200 unless a component is unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let encoder = TextEncoder::new();
    let metric_families = state.registry.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

fn error_response(status: StatusCode, message: impl ToString) -> Response {
    (status, Json(json!({ "error": message.to_string() }))).into_response()
}

async fn list_clusters(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.cluster_map.as_map())
}

async fn get_cluster(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.cluster_map.info_for(&id) {
        Some(info) => Json(info).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("unknown cluster '{}'", id)),
    }
}

async fn cluster_name_id(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    Json(json!({ "nameId": state.cluster_map.name_id_for(&id) }))
}

async fn get_pricing_config(State(state): State<Arc<AppState>>) -> Response {
    match state.provider.config() {
        Ok(config) => Json(config).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

#[derive(Debug, Deserialize)]
struct UpdateParams {
    #[serde(rename = "type", default)]
    update_type: String,
}

async fn update_pricing_config(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UpdateParams>,
    body: Bytes,
) -> Response {
    let mut reader = body.as_ref();

    match state.provider.update_config(&mut reader, &params.update_type) {
        Ok(config) => {
            state
                .logger
                .log_pricing_config_update(&params.update_type, true, "");
            Json(config).into_response()
        }
        Err(e) => {
            state
                .logger
                .log_pricing_config_update(&params.update_type, false, &e.to_string());
            let status = match e {
                PricingError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_REQUEST,
            };
            error_response(status, e)
        }
    }
}

async fn node_pricing(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.provider.all_node_pricing())
}

async fn network_pricing(State(state): State<Arc<AppState>>) -> Response {
    match state.provider.network_pricing() {
        Ok(network) => Json(network).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

async fn load_balancer_pricing(State(state): State<Arc<AppState>>) -> Response {
    match state.provider.load_balancer_pricing() {
        Ok(lb) => Json(lb).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/clusters", get(list_clusters))
        .route("/clusters/:id", get(get_cluster))
        .route("/clusters/:id/nameid", get(cluster_name_id))
        .route(
            "/pricing/config",
            get(get_pricing_config).post(update_pricing_config),
        )
        .route("/pricing/nodes", get(node_pricing))
        .route("/pricing/network", get(network_pricing))
        .route("/pricing/loadbalancer", get(load_balancer_pricing))
        .with_state(state)
}

/// Start the API server, returning when `shutdown` resolves
pub async fn serve<F>(port: u16, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
