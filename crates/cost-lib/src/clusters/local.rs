//! Local cluster identity sourced from the pricing provider

use super::LocalClusterInfoProvider;
use crate::cloud::Provider;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Local identity read from [`Provider::cluster_info`]
pub struct ProviderClusterInfo {
    provider: Arc<dyn Provider>,
}

impl ProviderClusterInfo {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }
}

impl LocalClusterInfoProvider for ProviderClusterInfo {
    fn cluster_info(&self) -> HashMap<String, String> {
        match self.provider.cluster_info() {
            Ok(info) => info,
            Err(e) => {
                warn!(error = %e, "Provider failed to report cluster info");
                HashMap::new()
            }
        }
    }
}
