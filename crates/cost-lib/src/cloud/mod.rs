//! Cloud pricing providers
//!
//! The [`Provider`] trait is the capability set the allocation engine uses
//! to price nodes, volumes, network egress and load balancers without
//! knowing which cloud a cluster runs on. [`CustomProvider`] prices from a
//! user-supplied rate card and is the reference implementation.

mod config;
mod custom;

pub use config::{CustomPricing, ProviderConfig};
pub use custom::{load_balancer_cost, CustomProvider, LoadBalancerRates};

use crate::error::PricingError;
use crate::models::{
    LoadBalancer, Network, Node, NodePrice, PricingSource, Pv, ServiceAccountStatus,
};
use k8s_openapi::api::core::v1::{Node as KubeNode, PersistentVolume};
use std::collections::{BTreeMap, HashMap};
use std::io::Read;

/// Feature tag of a node without special characteristics
pub const DEFAULT_FEATURES: &str = "default";
/// Feature tag of a spot or preemptible node
pub const SPOT_FEATURES: &str = "default,spot";
/// Feature tag of a node with a GPU
pub const GPU_FEATURES: &str = "default,gpu";

/// Well-known region labels, newest first
const REGION_LABELS: &[&str] = &[
    "topology.kubernetes.io/region",
    "failure-domain.beta.kubernetes.io/region",
];

/// Pricing lookup key derived from a node
pub trait Key: Send + Sync {
    /// Base feature tag used to select a rate table row
    fn features(&self) -> String;

    /// GPU type reported by the node labels, empty when the node has no GPU
    fn gpu_type(&self) -> String;

    /// Provider specific identity of the node
    fn id(&self) -> String;
}

/// Pricing lookup key derived from a persistent volume
pub trait PvKey: Send + Sync {
    fn features(&self) -> String;

    fn storage_class(&self) -> String;

    fn id(&self) -> String;
}

/// Capability set every cloud pricing backend implements
pub trait Provider: Send + Sync {
    /// Get the current pricing configuration
    fn config(&self) -> Result<CustomPricing, PricingError>;

    /// Rebuild the node rate table from the current configuration
    fn download_pricing_data(&self) -> Result<(), PricingError>;

    /// Copy of the whole node rate table
    fn all_node_pricing(&self) -> HashMap<String, NodePrice>;

    fn node_pricing(&self, key: &dyn Key) -> Result<Node, PricingError>;

    fn pv_pricing(&self, key: &dyn PvKey) -> Result<Pv, PricingError>;

    fn network_pricing(&self) -> Result<Network, PricingError>;

    fn load_balancer_pricing(&self) -> Result<LoadBalancer, PricingError>;

    /// Derive the pricing key of a node from its labels
    fn get_key(&self, labels: &BTreeMap<String, String>, node: &KubeNode) -> Box<dyn Key>;

    /// Derive the pricing key of a persistent volume
    fn get_pv_key(
        &self,
        pv: &PersistentVolume,
        parameters: &BTreeMap<String, String>,
        default_region: &str,
    ) -> Box<dyn PvKey>;

    /// Apply a JSON configuration update read from `reader`
    fn update_config(
        &self,
        reader: &mut dyn Read,
        update_type: &str,
    ) -> Result<CustomPricing, PricingError>;

    /// Apply a configuration update sourced from a config map
    fn update_config_from_config_map(
        &self,
        values: &HashMap<String, String>,
    ) -> Result<CustomPricing, PricingError>;

    /// Identity of the cluster this provider runs in
    fn cluster_info(&self) -> Result<HashMap<String, String>, PricingError>;

    /// Management platform name and hourly fee
    fn cluster_management_pricing(&self) -> (String, f64);

    fn management_platform(&self) -> String;

    /// Combine a default and a negotiated discount into one rate
    fn combined_discount_for_node(
        &self,
        instance_type: &str,
        is_preemptible: bool,
        default_discount: f64,
        negotiated_discount: f64,
    ) -> f64;

    fn service_account_status(&self) -> ServiceAccountStatus;

    fn pricing_source_status(&self) -> HashMap<String, PricingSource>;
}

/// Persistent volume key based on region and storage class parameters
#[derive(Debug, Clone, Default)]
pub struct StoragePvKey {
    pub labels: BTreeMap<String, String>,
    pub storage_class_name: String,
    pub storage_class_parameters: BTreeMap<String, String>,
    pub default_region: String,
    pub volume_handle: String,
}

impl StoragePvKey {
    pub fn from_pv(
        pv: &PersistentVolume,
        parameters: &BTreeMap<String, String>,
        default_region: &str,
    ) -> Self {
        let spec = pv.spec.as_ref();
        Self {
            labels: pv.metadata.labels.clone().unwrap_or_default(),
            storage_class_name: spec
                .and_then(|s| s.storage_class_name.clone())
                .unwrap_or_default(),
            storage_class_parameters: parameters.clone(),
            default_region: default_region.to_string(),
            volume_handle: spec
                .and_then(|s| s.csi.as_ref())
                .map(|csi| csi.volume_handle.clone())
                .unwrap_or_default(),
        }
    }

    fn region(&self) -> &str {
        REGION_LABELS
            .iter()
            .find_map(|label| self.labels.get(*label))
            .map(String::as_str)
            .unwrap_or(self.default_region.as_str())
    }
}

impl PvKey for StoragePvKey {
    fn features(&self) -> String {
        let class = self
            .storage_class_parameters
            .get("type")
            .map(String::as_str)
            .unwrap_or_default();
        format!("{},{}", self.region(), class)
    }

    fn storage_class(&self) -> String {
        self.storage_class_name.clone()
    }

    fn id(&self) -> String {
        self.volume_handle.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{CSIPersistentVolumeSource, PersistentVolumeSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn volume(labels: &[(&str, &str)]) -> PersistentVolume {
        PersistentVolume {
            metadata: ObjectMeta {
                name: Some("pv-data".to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            spec: Some(PersistentVolumeSpec {
                storage_class_name: Some("ssd".to_string()),
                csi: Some(CSIPersistentVolumeSource {
                    driver: "pd.csi.storage.gke.io".to_string(),
                    volume_handle: "projects/p/zones/z/disks/d".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_pv_key_uses_region_label() {
        let parameters = BTreeMap::from([("type".to_string(), "pd-ssd".to_string())]);
        let key = StoragePvKey::from_pv(
            &volume(&[("topology.kubernetes.io/region", "europe-west1")]),
            &parameters,
            "us-central1",
        );

        assert_eq!(key.features(), "europe-west1,pd-ssd");
        assert_eq!(key.storage_class(), "ssd");
        assert_eq!(key.id(), "projects/p/zones/z/disks/d");
    }

    #[test]
    fn test_pv_key_falls_back_to_default_region() {
        let key = StoragePvKey::from_pv(&volume(&[]), &BTreeMap::new(), "us-central1");

        assert_eq!(key.features(), "us-central1,");
    }
}
