//! Self-refreshing cluster map backed by the time-series backend

use super::{
    cluster_info_query, local_cluster_info, name_id, ClusterMap, LocalClusterInfoProvider,
    DEFAULT_REFRESH_INTERVAL, LOAD_RETRIES, LOAD_RETRY_DELAY,
};
use crate::error::QueryError;
use crate::health::{components, HealthRegistry};
use crate::models::ClusterInfo;
use crate::observability::CostModelMetrics;
use crate::prom::{retry, QueryClient, QueryResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Builder for [`PrometheusClusterMap`]
pub struct ClusterMapBuilder {
    client: Arc<dyn QueryClient>,
    local: Arc<dyn LocalClusterInfoProvider>,
    cluster_id: String,
    refresh_interval: Duration,
    retries: u32,
    retry_delay: Duration,
    metrics: Option<CostModelMetrics>,
    health: Option<HealthRegistry>,
}

impl ClusterMapBuilder {
    pub fn new(client: Arc<dyn QueryClient>, local: Arc<dyn LocalClusterInfoProvider>) -> Self {
        Self {
            client,
            local,
            cluster_id: String::new(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            retries: LOAD_RETRIES,
            retry_delay: LOAD_RETRY_DELAY,
            metrics: None,
            health: None,
        }
    }

    /// Id of the cluster this process runs in
    pub fn cluster_id(mut self, id: impl Into<String>) -> Self {
        self.cluster_id = id.into();
        self
    }

    /// Time between background refreshes; zero falls back to the default
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        if interval.is_zero() {
            warn!(
                default_secs = DEFAULT_REFRESH_INTERVAL.as_secs(),
                "Zero cluster refresh interval, using default"
            );
            self.refresh_interval = DEFAULT_REFRESH_INTERVAL;
        } else {
            self.refresh_interval = interval;
        }
        self
    }

    /// Override the attempt count and delay used for each refresh
    pub fn retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.retries = attempts;
        self.retry_delay = delay;
        self
    }

    pub fn metrics(mut self, metrics: CostModelMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Load the first snapshot and start the background refresh task.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn build(self) -> Arc<PrometheusClusterMap> {
        let state = Arc::new(ClusterState {
            client: self.client,
            local: self.local,
            cluster_id: self.cluster_id,
            clusters: RwLock::new(HashMap::new()),
            retries: self.retries,
            retry_delay: self.retry_delay,
            metrics: self.metrics,
            health: self.health,
        });

        if let Some(health) = &state.health {
            health.register(components::CLUSTER_MAP).await;
        }

        state.refresh().await;

        let token = CancellationToken::new();
        let task = spawn_refresh_loop(state.clone(), self.refresh_interval, token.clone());

        Arc::new(PrometheusClusterMap {
            state,
            stop: Mutex::new(Some(token)),
            task: Mutex::new(Some(task)),
        })
    }
}

/// Shared state of the map and its refresh task
struct ClusterState {
    client: Arc<dyn QueryClient>,
    local: Arc<dyn LocalClusterInfoProvider>,
    cluster_id: String,
    clusters: RwLock<HashMap<String, ClusterInfo>>,
    retries: u32,
    retry_delay: Duration,
    metrics: Option<CostModelMetrics>,
    health: Option<HealthRegistry>,
}

impl ClusterState {
    /// Load a new snapshot, keeping the current one if the backend is unavailable
    async fn refresh(&self) {
        let start = Instant::now();

        let clusters = match self.load_clusters().await {
            Ok(clusters) => clusters,
            Err(e) => {
                let elapsed = start.elapsed().as_secs_f64();
                error!(
                    attempts = self.retries.max(1),
                    error = %e,
                    "Failed to load cluster info, keeping previous snapshot"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.observe_cluster_refresh_failure(elapsed);
                }
                if let Some(health) = &self.health {
                    health
                        .set_degraded(
                            components::CLUSTER_MAP,
                            format!("Cluster info query failed: {}", e),
                        )
                        .await;
                }
                return;
            }
        };

        let count = clusters.len();
        *self.clusters.write().unwrap_or_else(PoisonError::into_inner) = clusters;

        let elapsed = start.elapsed().as_secs_f64();
        if let Some(metrics) = &self.metrics {
            metrics.observe_cluster_refresh(elapsed, count);
        }
        if let Some(health) = &self.health {
            health.set_healthy(components::CLUSTER_MAP).await;
        }

        info!(
            event = "cluster_refresh",
            cluster_count = count,
            elapsed_ms = (elapsed * 1000.0) as u64,
            "Refreshed cluster map"
        );
    }

    async fn load_clusters(&self) -> Result<HashMap<String, ClusterInfo>, QueryError> {
        let query = cluster_info_query(&self.client.query_offset());
        debug!(query = %query, "Loading cluster info");

        let rows = retry(self.retries, self.retry_delay, || self.client.query(&query)).await?;

        let mut clusters = HashMap::new();
        for row in &rows {
            match cluster_from_row(row) {
                Ok(info) => {
                    clusters.insert(info.id.clone(), info);
                }
                Err(e) => {
                    warn!(error = %e, "Skipping cluster info row");
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_rows_skipped();
                    }
                }
            }
        }

        if !clusters.contains_key(&self.cluster_id) {
            match local_cluster_info(&self.local.cluster_info()) {
                Ok(info) => {
                    debug!(cluster_id = %info.id, "Adding local cluster info");
                    clusters.insert(info.id.clone(), info);
                }
                Err(e) => {
                    error!(
                        cluster_id = %self.cluster_id,
                        error = %e,
                        "Failed to load local cluster info"
                    );
                }
            }
        }

        Ok(clusters)
    }
}

fn cluster_from_row(row: &QueryResult) -> Result<ClusterInfo, QueryError> {
    let optional = |label: &str| row.metric.get(label).cloned().unwrap_or_default();

    Ok(ClusterInfo {
        id: row.get_string("id")?.to_string(),
        name: row.get_string("name")?.to_string(),
        profile: optional("clusterprofile"),
        provider: optional("provider"),
        provisioner: optional("provisioner"),
    })
}

fn spawn_refresh_loop(
    state: Arc<ClusterState>,
    period: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            interval_secs = period.as_secs(),
            "Starting cluster map refresh loop"
        );

        let mut ticker = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    state.refresh().await;
                }
                _ = token.cancelled() => {
                    info!("Stopping cluster map refresh loop");
                    break;
                }
            }
        }
    })
}

/// Cluster map refreshed from the `kubecost_cluster_info` series
pub struct PrometheusClusterMap {
    state: Arc<ClusterState>,
    stop: Mutex<Option<CancellationToken>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PrometheusClusterMap {
    /// Run one refresh immediately, outside the background schedule
    pub async fn refresh(&self) {
        self.state.refresh().await;
    }

    /// Whether the background refresh task is still running
    pub fn is_refreshing(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Stop refreshing and wait for the background task to exit
    pub async fn shutdown(&self) {
        self.stop_refresh();

        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Cluster map refresh task ended abnormally");
            }
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, ClusterInfo>> {
        self.state
            .clusters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl ClusterMap for PrometheusClusterMap {
    fn cluster_ids(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    fn as_map(&self) -> HashMap<String, ClusterInfo> {
        self.read().clone()
    }

    fn info_for(&self, id: &str) -> Option<ClusterInfo> {
        self.read().get(id).cloned()
    }

    fn name_for(&self, id: &str) -> String {
        self.read()
            .get(id)
            .map(|info| info.name.clone())
            .unwrap_or_default()
    }

    fn name_id_for(&self, id: &str) -> String {
        self.read()
            .get(id)
            .map(name_id)
            .unwrap_or_else(|| id.to_string())
    }

    fn stop_refresh(&self) {
        let token = self.stop.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(token) = token {
            token.cancel();
            debug!("Cluster map refresh cancelled");
        }
    }
}

impl Drop for PrometheusClusterMap {
    fn drop(&mut self) {
        self.stop_refresh();
    }
}
