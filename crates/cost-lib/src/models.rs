//! Core data models for the cost model

use serde::{Deserialize, Serialize};

/// Identity and descriptive metadata of a cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub id: String,
    pub name: String,
    pub profile: String,
    pub provider: String,
    pub provisioner: String,
}

/// Rates for one feature tag of the node rate table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct NodePrice {
    pub cpu: String,
    pub ram: String,
    #[serde(default)]
    pub gpu: String,
}

/// Priced node returned to the allocation engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "vCPUCost")]
    pub vcpu_cost: String,
    #[serde(rename = "ramCost")]
    pub ram_cost: String,
    #[serde(rename = "gpuCost")]
    pub gpu_cost: String,
    /// Number of GPUs, empty when the node has none
    pub gpu: String,
}

/// Priced persistent volume
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pv {
    pub cost: String,
}

/// Network egress rates per GiB
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub zone_network_egress_cost: f64,
    pub region_network_egress_cost: f64,
    pub internet_network_egress_cost: f64,
}

/// Load balancer cost per hour
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub cost: f64,
}

/// A single credential or configuration check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountCheck {
    pub message: String,
    pub status: bool,
    pub additional_info: String,
}

/// Health of the credentials a provider uses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccountStatus {
    pub checks: Vec<ServiceAccountCheck>,
}

/// Status of one pricing data source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingSource {
    pub name: String,
    pub enabled: bool,
    pub available: bool,
    #[serde(default)]
    pub error: String,
}
