//! Cluster registry
//!
//! Maintains the set of clusters known to the cost model. The snapshot is
//! loaded from the `kubecost_cluster_info` series of the time-series backend
//! and refreshed in the background. When the backend has not indexed the
//! running cluster yet, its identity is filled in from local metadata.

mod local;
mod registry;


pub use local::ProviderClusterInfo;
pub use registry::{ClusterMapBuilder, PrometheusClusterMap};

use crate::error::ClusterInfoError;
use crate::models::ClusterInfo;
use std::collections::HashMap;
use std::time::Duration;

/// Attempts per refresh before the previous snapshot is kept
pub const LOAD_RETRIES: u32 = 6;

/// Fixed delay between refresh attempts
pub const LOAD_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Default interval between background refreshes
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Name of the cluster info series
pub const CLUSTER_INFO_METRIC: &str = "kubecost_cluster_info";

/// Read access to the cluster registry
pub trait ClusterMap: Send + Sync {
    /// Ids of every cluster in the current snapshot
    fn cluster_ids(&self) -> Vec<String>;

    /// Copy of the current snapshot keyed by cluster id
    fn as_map(&self) -> HashMap<String, ClusterInfo>;

    /// Copy of the record for `id`, if known
    fn info_for(&self, id: &str) -> Option<ClusterInfo>;

    /// Name of the cluster, empty when unknown or unnamed
    fn name_for(&self, id: &str) -> String;

    /// `<name>/<id>`, or the bare id when the cluster has no name or is unknown
    fn name_id_for(&self, id: &str) -> String;

    /// Decode a NameID into `(id, name)`
    fn split_name_id(&self, name_id: &str) -> (String, String) {
        split_name_id(name_id)
    }

    /// Stop background refreshes. Calling it more than once is a no-op.
    fn stop_refresh(&self);
}

/// Source of the running cluster's own identity
pub trait LocalClusterInfoProvider: Send + Sync {
    /// Map with `id`, `name` and optionally `clusterProfile`, `provider`, `provisioner`
    fn cluster_info(&self) -> HashMap<String, String>;
}

/// Encode a cluster record as a NameID
pub fn name_id(info: &ClusterInfo) -> String {
    if info.name.is_empty() {
        info.id.clone()
    } else {
        format!("{}/{}", info.name, info.id)
    }
}

/// Decode a NameID into `(id, name)`.
///
/// Splits on the first `/`, so names containing `/` do not round-trip.
pub fn split_name_id(name_id: &str) -> (String, String) {
    match name_id.split_once('/') {
        Some((name, id)) => (id.to_string(), name.to_string()),
        None => (name_id.to_string(), String::new()),
    }
}

/// Query for the cluster info series.
///
/// `offset` is a full modifier as returned by
/// [`QueryClient::query_offset`](crate::prom::QueryClient::query_offset).
pub fn cluster_info_query(offset: &str) -> String {
    format!("{CLUSTER_INFO_METRIC}{offset}")
}

/// Build a cluster record from local identity data
pub fn local_cluster_info(values: &HashMap<String, String>) -> Result<ClusterInfo, ClusterInfoError> {
    let id = values.get("id").ok_or(ClusterInfoError::MissingId)?;
    let name = values.get("name").ok_or(ClusterInfoError::MissingName)?;
    let optional = |key: &str| values.get(key).cloned().unwrap_or_default();

    Ok(ClusterInfo {
        id: id.clone(),
        name: name.clone(),
        profile: optional("clusterProfile"),
        provider: optional("provider"),
        provisioner: optional("provisioner"),
    })
}
