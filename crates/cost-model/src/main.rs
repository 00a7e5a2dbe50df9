//! Cost model - cluster registry and pricing service
//!
//! This binary keeps the multi-cluster registry fresh from Prometheus or
//! Thanos and serves custom pricing to the cost allocation engine.

use anyhow::{Context, Result};
use cost_lib::{
    cloud::{CustomProvider, Provider, ProviderConfig},
    clusters::{ClusterMap, ClusterMapBuilder, ProviderClusterInfo},
    health::{components, HealthRegistry},
    observability::{CostModelMetrics, StructuredLogger},
    prom::{PrometheusClientBuilder, QueryClient},
};
use cost_model::{api, config::AppConfig};
use prometheus::Registry;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const COST_MODEL_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting cost-model");

    let config = AppConfig::load()?;
    info!(
        cluster_id = %config.cluster_id,
        prometheus_endpoint = %config.prometheus_endpoint,
        thanos_enabled = config.thanos_enabled,
        "Cost model configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::PRICING).await;
    health_registry.register(components::QUERY_BACKEND).await;

    // Metrics live in a registry owned here and are torn down on exit
    let registry = Registry::new();
    let metrics = CostModelMetrics::register(&registry).context("failed to register metrics")?;

    let logger = StructuredLogger::new(&config.cluster_id);

    let provider_config = match &config.pricing_config_path {
        Some(path) => ProviderConfig::load(path).context("failed to load pricing config")?,
        None => ProviderConfig::default(),
    };
    let provider = Arc::new(
        CustomProvider::new(Arc::new(provider_config), &config.cluster_id)
            .with_metrics(metrics.clone()),
    );
    if let Err(e) = provider.download_pricing_data() {
        warn!(error = %e, "Initial pricing rebuild failed");
        health_registry
            .set_degraded(components::PRICING, e.to_string())
            .await;
    }

    let mut client_builder = PrometheusClientBuilder::new()
        .endpoint(&config.prometheus_endpoint)
        .timeout(config.query_timeout());
    if config.thanos_enabled {
        client_builder = client_builder.thanos(&config.thanos_query_offset);
    }
    let client: Arc<dyn QueryClient> = match client_builder.build() {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "Invalid time-series endpoint");
            health_registry
                .set_unhealthy(components::QUERY_BACKEND, e.to_string())
                .await;
            return Err(e).context("failed to create time-series client");
        }
    };

    let backend = if config.thanos_enabled { "thanos" } else { "prometheus" };
    logger.log_startup(COST_MODEL_VERSION, backend);

    let provider: Arc<dyn Provider> = provider;
    let local_info = Arc::new(ProviderClusterInfo::new(provider.clone()));
    let cluster_map = ClusterMapBuilder::new(client, local_info)
        .cluster_id(&config.cluster_id)
        .refresh_interval(config.cluster_refresh_interval())
        .retry(config.cluster_load_retries, config.cluster_load_retry_delay())
        .metrics(metrics.clone())
        .health(health_registry.clone())
        .build()
        .await;
    info!(
        cluster_count = cluster_map.cluster_ids().len(),
        "Cluster map initialized"
    );

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics.clone(),
        registry.clone(),
        cluster_map.clone(),
        provider,
        logger.clone(),
    ));

    // Mark the cost model as ready after initialization
    health_registry.set_ready(true).await;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state, async move {
        let _ = shutdown_rx.await;
    }));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;

    let _ = shutdown_tx.send(());
    match api_handle.await {
        Ok(Err(e)) => error!(error = %e, "API server failed"),
        Err(e) => error!(error = %e, "API server task panicked"),
        Ok(Ok(())) => {}
    }

    cluster_map.shutdown().await;
    if let Err(e) = metrics.unregister(&registry) {
        warn!(error = %e, "Failed to unregister metrics");
    }

    info!("Shutting down");
    Ok(())
}
