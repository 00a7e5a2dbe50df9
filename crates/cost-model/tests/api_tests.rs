//! Integration tests for the cost model API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use cost_lib::{
    cloud::{CustomPricing, CustomProvider, Provider, ProviderConfig},
    clusters::{name_id, ClusterMap},
    health::{components, HealthRegistry},
    observability::{CostModelMetrics, StructuredLogger},
    ClusterInfo,
};
use cost_model::api::{create_router, AppState};
use prometheus::Registry;
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

/// Fixed cluster map standing in for the refreshing registry
struct StaticClusterMap {
    clusters: HashMap<String, ClusterInfo>,
}

impl StaticClusterMap {
    fn new() -> Self {
        let clusters = [
            ClusterInfo {
                id: "cluster-one".to_string(),
                name: "production".to_string(),
                profile: "production".to_string(),
                provider: "GCP".to_string(),
                provisioner: "GKE".to_string(),
            },
            ClusterInfo {
                id: "cluster-two".to_string(),
                ..Default::default()
            },
        ]
        .into_iter()
        .map(|info| (info.id.clone(), info))
        .collect();

        Self { clusters }
    }
}

impl ClusterMap for StaticClusterMap {
    fn cluster_ids(&self) -> Vec<String> {
        self.clusters.keys().cloned().collect()
    }

    fn as_map(&self) -> HashMap<String, ClusterInfo> {
        self.clusters.clone()
    }

    fn info_for(&self, id: &str) -> Option<ClusterInfo> {
        self.clusters.get(id).cloned()
    }

    fn name_for(&self, id: &str) -> String {
        self.clusters
            .get(id)
            .map(|info| info.name.clone())
            .unwrap_or_default()
    }

    fn name_id_for(&self, id: &str) -> String {
        self.clusters
            .get(id)
            .map(name_id)
            .unwrap_or_else(|| id.to_string())
    }

    fn stop_refresh(&self) {}
}

fn test_pricing() -> CustomPricing {
    let mut pricing = CustomPricing::default();
    pricing.cpu = "0.05".to_string();
    pricing.ram = "0.01".to_string();
    pricing.gpu = "0.90".to_string();
    pricing.spot_cpu = "0.015".to_string();
    pricing.first_five_forwarding_rules_cost = "0.025".to_string();
    pricing
}

async fn setup_test_app_with(pricing: CustomPricing) -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::CLUSTER_MAP).await;
    health_registry.register(components::PRICING).await;

    let registry = Registry::new();
    let metrics = CostModelMetrics::register(&registry).unwrap();

    let provider = CustomProvider::new(Arc::new(ProviderConfig::new(pricing)), "cluster-one")
        .with_metrics(metrics.clone());
    provider.download_pricing_data().unwrap();

    let state = Arc::new(AppState::new(
        health_registry,
        metrics,
        registry,
        Arc::new(StaticClusterMap::new()),
        Arc::new(provider),
        StructuredLogger::new("cluster-one"),
    ));
    let router = create_router(state.clone());

    (router, state)
}

async fn setup_test_app() -> (Router, Arc<AppState>) {
    setup_test_app_with(test_pricing()).await
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn post_json(app: Router, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

fn json(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let (app, state) = setup_test_app().await;

    // A failed refresh keeps serving the previous snapshot
    state
        .health_registry
        .set_degraded(components::CLUSTER_MAP, "Cluster info query failed")
        .await;

    let (status, body) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_unhealthy(components::PRICING, "Pricing config unreadable")
        .await;

    let (status, body) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json(&body)["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_returns_503_when_not_ready() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/readyz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json(&body)["ready"], false);
}

#[tokio::test]
async fn test_readyz_returns_ok_when_ready() {
    let (app, state) = setup_test_app().await;

    state.health_registry.set_ready(true).await;

    let (status, body) = get(app, "/readyz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint_uses_owned_registry() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("cost_model_pricing_rebuilds_total 1"));
    assert!(text.contains("cost_model_cluster_map_clusters"));
}

#[tokio::test]
async fn test_list_clusters() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/clusters").await;

    assert_eq!(status, StatusCode::OK);
    let clusters = json(&body);
    assert_eq!(clusters.as_object().unwrap().len(), 2);
    assert_eq!(clusters["cluster-one"]["name"], "production");
    assert_eq!(clusters["cluster-one"]["provisioner"], "GKE");
}

#[tokio::test]
async fn test_get_cluster_and_unknown_cluster() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app.clone(), "/clusters/cluster-one").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["id"], "cluster-one");

    let (status, body) = get(app, "/clusters/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json(&body)["error"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn test_cluster_name_id() {
    let (app, _state) = setup_test_app().await;

    let (_, body) = get(app.clone(), "/clusters/cluster-one/nameid").await;
    assert_eq!(json(&body)["nameId"], "production/cluster-one");

    let (_, body) = get(app.clone(), "/clusters/cluster-two/nameid").await;
    assert_eq!(json(&body)["nameId"], "cluster-two");

    let (status, body) = get(app, "/clusters/missing/nameid").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["nameId"], "missing");
}

#[tokio::test]
async fn test_get_pricing_config() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/pricing/config").await;

    assert_eq!(status, StatusCode::OK);
    let config = json(&body);
    assert_eq!(config["CPU"], "0.05");
    assert_eq!(config["spotCPU"], "0.015");
}

#[tokio::test]
async fn test_update_pricing_config_rebuilds_table() {
    let (app, state) = setup_test_app().await;

    let (status, config) =
        post_json(app.clone(), "/pricing/config?type=manual", r#"{"CPU": "0.07"}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(config["CPU"], "0.07");

    let (_, body) = get(app, "/pricing/nodes").await;
    assert_eq!(json(&body)["default"]["CPU"], "0.07");
    assert_eq!(state.metrics.config_updates("success"), 1);
}

#[tokio::test]
async fn test_update_pricing_config_rejects_unknown_field() {
    let (app, state) = setup_test_app().await;

    let (status, body) = post_json(
        app.clone(),
        "/pricing/config",
        r#"{"CPU": "0.07", "bogus": "1"}"#,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Bogus"));
    assert_eq!(state.provider.config().unwrap().cpu, "0.05");
    assert_eq!(state.metrics.config_updates("rejected"), 1);
}

#[tokio::test]
async fn test_node_pricing_rows() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/pricing/nodes").await;

    assert_eq!(status, StatusCode::OK);
    let table = json(&body);
    assert_eq!(table.as_object().unwrap().len(), 3);
    assert_eq!(table["default"]["RAM"], "0.01");
    assert_eq!(table["default,spot"]["CPU"], "0.015");
    assert_eq!(table["default,gpu"]["GPU"], "0.90");
}

#[tokio::test]
async fn test_network_and_load_balancer_pricing() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app.clone(), "/pricing/network").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["internetNetworkEgressCost"], 0.12);

    let (status, body) = get(app, "/pricing/loadbalancer").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["cost"], 0.025);
}

#[tokio::test]
async fn test_unparseable_rate_returns_500() {
    let mut pricing = test_pricing();
    pricing.zone_network_egress = "free".to_string();
    let (app, _state) = setup_test_app_with(pricing).await;

    let (status, body) = get(app, "/pricing/network").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json(&body)["error"]
        .as_str()
        .unwrap()
        .contains("zoneNetworkEgress"));
}
