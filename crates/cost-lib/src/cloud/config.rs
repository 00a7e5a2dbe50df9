//! Pricing configuration shared by providers
//!
//! [`ProviderConfig`] owns the current [`CustomPricing`] rate card. It can be
//! backed by a JSON file, in which case every committed update is written
//! back to disk. Updates are applied to a copy and only committed when every
//! field succeeds.

use crate::error::{ConfigError, PricingError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info};

/// Rate card and label settings for the custom provider
///
/// All values are kept as strings, exactly as they appear in the pricing
/// file; numeric fields are parsed where they are used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomPricing {
    pub provider: String,
    pub description: String,
    #[serde(rename = "CPU")]
    pub cpu: String,
    #[serde(rename = "spotCPU")]
    pub spot_cpu: String,
    #[serde(rename = "RAM")]
    pub ram: String,
    #[serde(rename = "spotRAM")]
    pub spot_ram: String,
    #[serde(rename = "GPU")]
    pub gpu: String,
    #[serde(rename = "spotGPU")]
    pub spot_gpu: String,
    pub storage: String,
    #[serde(rename = "zoneNetworkEgress")]
    pub zone_network_egress: String,
    #[serde(rename = "regionNetworkEgress")]
    pub region_network_egress: String,
    #[serde(rename = "internetNetworkEgress")]
    pub internet_network_egress: String,
    #[serde(rename = "firstFiveForwardingRulesCost")]
    pub first_five_forwarding_rules_cost: String,
    #[serde(rename = "additionalForwardingRuleCost")]
    pub additional_forwarding_rule_cost: String,
    #[serde(rename = "LBIngressDataCost")]
    pub lb_ingress_data_cost: String,
    #[serde(rename = "spotLabel")]
    pub spot_label: String,
    #[serde(rename = "spotLabelValue")]
    pub spot_label_value: String,
    #[serde(rename = "gpuLabel")]
    pub gpu_label: String,
    #[serde(rename = "gpuLabelValue")]
    pub gpu_label_value: String,
    #[serde(rename = "clusterName")]
    pub cluster_name: String,
    #[serde(rename = "customPricesEnabled")]
    pub custom_prices_enabled: String,
    pub discount: String,
    #[serde(rename = "negotiatedDiscount")]
    pub negotiated_discount: String,
}

impl Default for CustomPricing {
    fn default() -> Self {
        Self {
            provider: "custom".to_string(),
            description: "Default prices based on GCP us-central1".to_string(),
            cpu: "0.031611".to_string(),
            spot_cpu: "0.006655".to_string(),
            ram: "0.004237".to_string(),
            spot_ram: "0.000892".to_string(),
            gpu: "0.95".to_string(),
            spot_gpu: "0.308".to_string(),
            storage: "0.00005479452".to_string(),
            zone_network_egress: "0.01".to_string(),
            region_network_egress: "0.01".to_string(),
            internet_network_egress: "0.12".to_string(),
            first_five_forwarding_rules_cost: "0.025".to_string(),
            additional_forwarding_rule_cost: "0.010".to_string(),
            lb_ingress_data_cost: "0.008".to_string(),
            spot_label: String::new(),
            spot_label_value: String::new(),
            gpu_label: String::new(),
            gpu_label_value: String::new(),
            cluster_name: String::new(),
            custom_prices_enabled: "false".to_string(),
            discount: String::new(),
            negotiated_discount: String::new(),
        }
    }
}

/// How a field value is validated before assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    /// Free text
    Text,
    /// Non-negative decimal rate, or empty
    Rate,
    /// `true` or `false`
    Flag,
}

/// Entry of the field setter table
struct PricingField {
    name: &'static str,
    kind: FieldKind,
    slot: fn(&mut CustomPricing) -> &mut String,
}

/// Updatable fields, keyed by their capitalized name
const PRICING_FIELDS: &[PricingField] = &[
    PricingField { name: "Provider", kind: FieldKind::Text, slot: |c| &mut c.provider },
    PricingField { name: "Description", kind: FieldKind::Text, slot: |c| &mut c.description },
    PricingField { name: "CPU", kind: FieldKind::Rate, slot: |c| &mut c.cpu },
    PricingField { name: "SpotCPU", kind: FieldKind::Rate, slot: |c| &mut c.spot_cpu },
    PricingField { name: "RAM", kind: FieldKind::Rate, slot: |c| &mut c.ram },
    PricingField { name: "SpotRAM", kind: FieldKind::Rate, slot: |c| &mut c.spot_ram },
    PricingField { name: "GPU", kind: FieldKind::Rate, slot: |c| &mut c.gpu },
    PricingField { name: "SpotGPU", kind: FieldKind::Rate, slot: |c| &mut c.spot_gpu },
    PricingField { name: "Storage", kind: FieldKind::Rate, slot: |c| &mut c.storage },
    PricingField { name: "ZoneNetworkEgress", kind: FieldKind::Rate, slot: |c| &mut c.zone_network_egress },
    PricingField { name: "RegionNetworkEgress", kind: FieldKind::Rate, slot: |c| &mut c.region_network_egress },
    PricingField { name: "InternetNetworkEgress", kind: FieldKind::Rate, slot: |c| &mut c.internet_network_egress },
    PricingField { name: "FirstFiveForwardingRulesCost", kind: FieldKind::Rate, slot: |c| &mut c.first_five_forwarding_rules_cost },
    PricingField { name: "AdditionalForwardingRuleCost", kind: FieldKind::Rate, slot: |c| &mut c.additional_forwarding_rule_cost },
    PricingField { name: "LBIngressDataCost", kind: FieldKind::Rate, slot: |c| &mut c.lb_ingress_data_cost },
    PricingField { name: "SpotLabel", kind: FieldKind::Text, slot: |c| &mut c.spot_label },
    PricingField { name: "SpotLabelValue", kind: FieldKind::Text, slot: |c| &mut c.spot_label_value },
    PricingField { name: "GpuLabel", kind: FieldKind::Text, slot: |c| &mut c.gpu_label },
    PricingField { name: "GpuLabelValue", kind: FieldKind::Text, slot: |c| &mut c.gpu_label_value },
    PricingField { name: "ClusterName", kind: FieldKind::Text, slot: |c| &mut c.cluster_name },
    PricingField { name: "CustomPricesEnabled", kind: FieldKind::Flag, slot: |c| &mut c.custom_prices_enabled },
    PricingField { name: "Discount", kind: FieldKind::Rate, slot: |c| &mut c.discount },
    PricingField { name: "NegotiatedDiscount", kind: FieldKind::Rate, slot: |c| &mut c.negotiated_discount },
];

/// Upper-case the first character so `spotCPU` and `SpotCPU` name the same field
fn normalize_field_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn validate(field: &str, kind: FieldKind, value: &str) -> Result<(), PricingError> {
    let invalid = |reason: &str| PricingError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };

    match kind {
        FieldKind::Text => Ok(()),
        FieldKind::Rate if value.is_empty() => Ok(()),
        FieldKind::Rate => match value.trim().parse::<f64>() {
            Ok(rate) if rate.is_finite() && rate >= 0.0 => Ok(()),
            Ok(_) => Err(invalid("rate must be a non-negative finite number")),
            Err(e) => Err(invalid(&e.to_string())),
        },
        FieldKind::Flag => match value {
            "true" | "false" => Ok(()),
            _ => Err(invalid("expected 'true' or 'false'")),
        },
    }
}

impl CustomPricing {
    /// Assign a single field by name.
    ///
    /// The first character of `name` is case-insensitive. Unknown names and
    /// values that fail validation leave the record untouched.
    pub fn set_field(&mut self, name: &str, value: impl Into<String>) -> Result<(), PricingError> {
        let normalized = normalize_field_name(name);
        let field = PRICING_FIELDS
            .iter()
            .find(|f| f.name == normalized)
            .ok_or(PricingError::UnknownField(normalized.clone()))?;

        let value = value.into();
        validate(field.name, field.kind, &value)?;
        *(field.slot)(self) = value;
        Ok(())
    }

    /// Names accepted by [`CustomPricing::set_field`]
    pub fn field_names() -> impl Iterator<Item = &'static str> {
        PRICING_FIELDS.iter().map(|f| f.name)
    }
}

/// Shared pricing configuration store
pub struct ProviderConfig {
    path: Option<PathBuf>,
    pricing: RwLock<CustomPricing>,
}

impl ProviderConfig {
    /// Create an in-memory configuration
    pub fn new(pricing: CustomPricing) -> Self {
        Self {
            path: None,
            pricing: RwLock::new(pricing),
        }
    }

    /// Load the configuration from `path`, writing defaults if it does not exist
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();

        let pricing = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
            let pricing = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
            info!(path = %path.display(), "Loaded pricing configuration");
            pricing
        } else {
            let pricing = CustomPricing::default();
            persist(&path, &pricing)?;
            info!(path = %path.display(), "Wrote default pricing configuration");
            pricing
        };

        Ok(Self {
            path: Some(path),
            pricing: RwLock::new(pricing),
        })
    }

    /// Get the backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Get a copy of the current pricing configuration
    pub fn custom_pricing_data(&self) -> CustomPricing {
        self.pricing
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply `f` to a copy of the configuration and commit it if `f` succeeds.
    ///
    /// Concurrent updates are serialized. When the store is file-backed the
    /// new configuration is persisted before it becomes visible; a write
    /// failure rejects the update.
    pub fn update<F>(&self, f: F) -> Result<CustomPricing, PricingError>
    where
        F: FnOnce(&mut CustomPricing) -> Result<(), PricingError>,
    {
        let mut current = self.pricing.write().unwrap_or_else(PoisonError::into_inner);

        let mut updated = current.clone();
        f(&mut updated)?;

        if let Some(path) = &self.path {
            persist(path, &updated)?;
        }

        *current = updated.clone();
        debug!("Committed pricing configuration update");
        Ok(updated)
    }

    /// Apply every entry of `values` through [`CustomPricing::set_field`]
    pub fn update_from_map(
        &self,
        values: &HashMap<String, String>,
    ) -> Result<CustomPricing, PricingError> {
        self.update(|pricing| {
            for (name, value) in values {
                pricing.set_field(name, value.as_str())?;
            }
            Ok(())
        })
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::new(CustomPricing::default())
    }
}

fn persist(path: &Path, pricing: &CustomPricing) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.display().to_string(),
                source,
            })?;
        }
    }

    let content = serde_json::to_string_pretty(pricing).map_err(ConfigError::Serialize)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Write {
        path: path.display().to_string(),
        source,
    })
}
