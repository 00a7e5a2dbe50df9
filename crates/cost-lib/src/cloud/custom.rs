//! Custom pricing provider
//!
//! Prices every node from a single user-supplied rate card. The rate table
//! has exactly three rows (`default`, `default,spot`, `default,gpu`) and is
//! rebuilt whenever the configuration changes.
//!
//! Known limitation: a node that is both spot and GPU resolves to
//! `default,spot,gpu`, which has no row. Such lookups fail with
//! [`PricingError::MissingRate`] instead of picking a price.

use super::{
    CustomPricing, Key, Provider, ProviderConfig, PvKey, StoragePvKey, DEFAULT_FEATURES,
    GPU_FEATURES, SPOT_FEATURES,
};
use crate::error::PricingError;
use crate::models::{
    LoadBalancer, Network, Node, NodePrice, PricingSource, Pv, ServiceAccountStatus,
};
use crate::observability::CostModelMetrics;
use k8s_openapi::api::core::v1::{Node as KubeNode, PersistentVolume};
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Number of forwarding rules billed at the first-five rate
const FIRST_TIER_FORWARDING_RULES: u32 = 5;

/// Placeholder inputs until forwarding rules and ingress data are measured
const DEFAULT_FORWARDING_RULES: u32 = 1;
const DEFAULT_INGRESS_DATA_GB: f64 = 0.0;

/// Load balancer rates parsed from the configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadBalancerRates {
    /// Hourly rate per rule for the first five forwarding rules
    pub first_five_forwarding_rules: f64,
    /// Hourly rate per rule beyond the fifth
    pub additional_forwarding_rule: f64,
    /// Rate per GB of ingress data
    pub ingress_data_per_gb: f64,
}

/// Tiered load balancer cost
pub fn load_balancer_cost(rates: &LoadBalancerRates, forwarding_rules: u32, ingress_gb: f64) -> f64 {
    let first_tier = forwarding_rules.min(FIRST_TIER_FORWARDING_RULES);
    let additional = forwarding_rules.saturating_sub(FIRST_TIER_FORWARDING_RULES);

    rates.first_five_forwarding_rules * f64::from(first_tier)
        + rates.additional_forwarding_rule * f64::from(additional)
        + rates.ingress_data_per_gb * ingress_gb
}

fn parse_rate(field: &'static str, value: &str) -> Result<f64, PricingError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|source| PricingError::Parse {
            field,
            value: value.to_string(),
            source,
        })
}

/// Rate table and the label settings captured at the last rebuild
#[derive(Debug, Default)]
struct PricingTable {
    pricing: HashMap<String, NodePrice>,
    spot_label: String,
    spot_label_value: String,
    gpu_label: String,
    gpu_label_value: String,
}

/// Pricing key derived from node labels
#[derive(Debug, Clone)]
struct CustomProviderKey {
    spot_label: String,
    spot_label_value: String,
    gpu_label: String,
    labels: BTreeMap<String, String>,
}

impl Key for CustomProviderKey {
    fn features(&self) -> String {
        match self.labels.get(&self.spot_label) {
            Some(value) if !value.is_empty() && *value == self.spot_label_value => {
                SPOT_FEATURES.to_string()
            }
            _ => DEFAULT_FEATURES.to_string(),
        }
    }

    fn gpu_type(&self) -> String {
        self.labels.get(&self.gpu_label).cloned().unwrap_or_default()
    }

    fn id(&self) -> String {
        String::new()
    }
}

/// Provider that prices nodes from a custom rate card
pub struct CustomProvider {
    config: Arc<ProviderConfig>,
    cluster_id: String,
    table: RwLock<PricingTable>,
    metrics: Option<CostModelMetrics>,
}

impl CustomProvider {
    /// Create a provider for the cluster `cluster_id`.
    ///
    /// The rate table is empty until [`Provider::download_pricing_data`] runs.
    pub fn new(config: Arc<ProviderConfig>, cluster_id: impl Into<String>) -> Self {
        Self {
            config,
            cluster_id: cluster_id.into(),
            table: RwLock::new(PricingTable::default()),
            metrics: None,
        }
    }

    /// Record rebuilds and configuration updates in `metrics`
    pub fn with_metrics(mut self, metrics: CostModelMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Label name and value that mark a GPU node, as of the last rebuild
    pub fn gpu_label(&self) -> (String, String) {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        (table.gpu_label.clone(), table.gpu_label_value.clone())
    }

    fn load_balancer_rates(pricing: &CustomPricing) -> Result<LoadBalancerRates, PricingError> {
        Ok(LoadBalancerRates {
            first_five_forwarding_rules: parse_rate(
                "firstFiveForwardingRulesCost",
                &pricing.first_five_forwarding_rules_cost,
            )?,
            additional_forwarding_rule: parse_rate(
                "additionalForwardingRuleCost",
                &pricing.additional_forwarding_rule_cost,
            )?,
            ingress_data_per_gb: parse_rate("LBIngressDataCost", &pricing.lb_ingress_data_cost)?,
        })
    }

    fn record_update(&self, result: &Result<CustomPricing, PricingError>) {
        if let Some(metrics) = &self.metrics {
            metrics.record_config_update(result.is_ok());
        }
    }

    /// Rebuild after a committed update; the update itself already succeeded
    fn rebuild_after_update(&self) {
        if let Err(e) = self.download_pricing_data() {
            warn!(error = %e, "Failed to rebuild pricing after config update");
        }
    }
}

impl Provider for CustomProvider {
    fn config(&self) -> Result<CustomPricing, PricingError> {
        Ok(self.config.custom_pricing_data())
    }

    fn download_pricing_data(&self) -> Result<(), PricingError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let pricing = self.config.custom_pricing_data();

        table.spot_label = pricing.spot_label.clone();
        table.spot_label_value = pricing.spot_label_value.clone();
        table.gpu_label = pricing.gpu_label.clone();
        table.gpu_label_value = pricing.gpu_label_value.clone();

        table.pricing = HashMap::from([
            (
                DEFAULT_FEATURES.to_string(),
                NodePrice {
                    cpu: pricing.cpu.clone(),
                    ram: pricing.ram.clone(),
                    gpu: String::new(),
                },
            ),
            (
                SPOT_FEATURES.to_string(),
                NodePrice {
                    cpu: pricing.spot_cpu.clone(),
                    ram: pricing.spot_ram.clone(),
                    gpu: String::new(),
                },
            ),
            (
                GPU_FEATURES.to_string(),
                NodePrice {
                    cpu: pricing.cpu.clone(),
                    ram: pricing.ram.clone(),
                    gpu: pricing.gpu.clone(),
                },
            ),
        ]);

        if let Some(metrics) = &self.metrics {
            metrics.inc_pricing_rebuilds();
        }
        debug!(entries = table.pricing.len(), "Rebuilt custom node pricing");
        Ok(())
    }

    fn all_node_pricing(&self) -> HashMap<String, NodePrice> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .pricing
            .clone()
    }

    fn node_pricing(&self, key: &dyn Key) -> Result<Node, PricingError> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);

        let mut features = key.features();
        if !table.pricing.contains_key(&features) {
            features = DEFAULT_FEATURES.to_string();
        }

        let mut gpu_count = String::new();
        if !key.gpu_type().is_empty() {
            // One GPU per node until GPU counts are read from node capacity
            features.push_str(",gpu");
            gpu_count = "1".to_string();
        }

        let price = table
            .pricing
            .get(&features)
            .ok_or_else(|| PricingError::MissingRate(features.clone()))?;

        Ok(Node {
            vcpu_cost: price.cpu.clone(),
            ram_cost: price.ram.clone(),
            gpu_cost: price.gpu.clone(),
            gpu: gpu_count,
        })
    }

    fn pv_pricing(&self, _key: &dyn PvKey) -> Result<Pv, PricingError> {
        Ok(Pv {
            cost: self.config.custom_pricing_data().storage,
        })
    }

    fn network_pricing(&self) -> Result<Network, PricingError> {
        let pricing = self.config.custom_pricing_data();

        Ok(Network {
            zone_network_egress_cost: parse_rate("zoneNetworkEgress", &pricing.zone_network_egress)?,
            region_network_egress_cost: parse_rate(
                "regionNetworkEgress",
                &pricing.region_network_egress,
            )?,
            internet_network_egress_cost: parse_rate(
                "internetNetworkEgress",
                &pricing.internet_network_egress,
            )?,
        })
    }

    fn load_balancer_pricing(&self) -> Result<LoadBalancer, PricingError> {
        let rates = Self::load_balancer_rates(&self.config.custom_pricing_data())?;

        Ok(LoadBalancer {
            cost: load_balancer_cost(&rates, DEFAULT_FORWARDING_RULES, DEFAULT_INGRESS_DATA_GB),
        })
    }

    fn get_key(&self, labels: &BTreeMap<String, String>, _node: &KubeNode) -> Box<dyn Key> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);

        Box::new(CustomProviderKey {
            spot_label: table.spot_label.clone(),
            spot_label_value: table.spot_label_value.clone(),
            gpu_label: table.gpu_label.clone(),
            labels: labels.clone(),
        })
    }

    fn get_pv_key(
        &self,
        pv: &PersistentVolume,
        parameters: &BTreeMap<String, String>,
        default_region: &str,
    ) -> Box<dyn PvKey> {
        Box::new(StoragePvKey::from_pv(pv, parameters, default_region))
    }

    fn update_config(
        &self,
        reader: &mut dyn Read,
        update_type: &str,
    ) -> Result<CustomPricing, PricingError> {
        let result = serde_json::from_reader::<_, serde_json::Map<String, serde_json::Value>>(reader)
            .map_err(PricingError::Decode)
            .and_then(|values| {
                self.config.update(|pricing| {
                    for (name, value) in &values {
                        let value = value
                            .as_str()
                            .ok_or_else(|| PricingError::NonStringValue(name.clone()))?;
                        pricing.set_field(name, value)?;
                    }
                    Ok(())
                })
            });

        self.record_update(&result);
        let updated = result?;

        info!(update_type = %update_type, "Applied custom pricing update");
        self.rebuild_after_update();
        Ok(updated)
    }

    fn update_config_from_config_map(
        &self,
        values: &HashMap<String, String>,
    ) -> Result<CustomPricing, PricingError> {
        let result = self.config.update_from_map(values);

        self.record_update(&result);
        let updated = result?;

        info!(fields = values.len(), "Applied custom pricing from config map");
        self.rebuild_after_update();
        Ok(updated)
    }

    fn cluster_info(&self) -> Result<HashMap<String, String>, PricingError> {
        let pricing = self.config.custom_pricing_data();

        let mut info = HashMap::new();
        if !pricing.cluster_name.is_empty() {
            info.insert("name".to_string(), pricing.cluster_name);
        }
        info.insert("provider".to_string(), "custom".to_string());
        info.insert("id".to_string(), self.cluster_id.clone());
        Ok(info)
    }

    fn cluster_management_pricing(&self) -> (String, f64) {
        (String::new(), 0.0)
    }

    fn management_platform(&self) -> String {
        String::new()
    }

    fn combined_discount_for_node(
        &self,
        _instance_type: &str,
        _is_preemptible: bool,
        default_discount: f64,
        negotiated_discount: f64,
    ) -> f64 {
        1.0 - (1.0 - default_discount) * (1.0 - negotiated_discount)
    }

    fn service_account_status(&self) -> ServiceAccountStatus {
        ServiceAccountStatus { checks: Vec::new() }
    }

    fn pricing_source_status(&self) -> HashMap<String, PricingSource> {
        HashMap::new()
    }
}
