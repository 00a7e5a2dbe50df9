//! Cost model configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Environment variable naming an optional configuration file
pub const CONFIG_FILE_ENV: &str = "COST_MODEL_CONFIG_FILE";

const ENV_PREFIX: &str = "COST_MODEL";

/// Cost model configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Id of the cluster this process runs in
    #[serde(default = "default_cluster_id")]
    pub cluster_id: String,

    /// Base URL of the Prometheus or Thanos query API
    #[serde(default = "default_prometheus_endpoint")]
    pub prometheus_endpoint: String,

    /// Query through Thanos, applying an offset to every query
    #[serde(default)]
    pub thanos_enabled: bool,

    /// Offset duration for Thanos queries, such as `3h`
    #[serde(default = "default_thanos_query_offset")]
    pub thanos_query_offset: String,

    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    /// Interval between cluster map refreshes in seconds
    #[serde(default = "default_cluster_refresh_interval")]
    pub cluster_refresh_interval_secs: u64,

    #[serde(default = "default_cluster_load_retries")]
    pub cluster_load_retries: u32,

    #[serde(default = "default_cluster_load_retry_delay")]
    pub cluster_load_retry_delay_secs: u64,

    /// JSON file holding the custom pricing configuration; in-memory when unset
    #[serde(default)]
    pub pricing_config_path: Option<String>,

    /// API server port for health, metrics and pricing routes
    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

fn default_cluster_id() -> String {
    std::env::var("CLUSTER_ID").unwrap_or_else(|_| "cluster-one".to_string())
}

fn default_prometheus_endpoint() -> String {
    "http://prometheus-server:9090".to_string()
}

fn default_thanos_query_offset() -> String {
    cost_lib::prom::DEFAULT_THANOS_OFFSET.to_string()
}

fn default_query_timeout() -> u64 {
    120
}

fn default_cluster_refresh_interval() -> u64 {
    300
}

fn default_cluster_load_retries() -> u32 {
    cost_lib::clusters::LOAD_RETRIES
}

fn default_cluster_load_retry_delay() -> u64 {
    cost_lib::clusters::LOAD_RETRY_DELAY.as_secs()
}

fn default_api_port() -> u16 {
    9003
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cluster_id: default_cluster_id(),
            prometheus_endpoint: default_prometheus_endpoint(),
            thanos_enabled: false,
            thanos_query_offset: default_thanos_query_offset(),
            query_timeout_secs: default_query_timeout(),
            cluster_refresh_interval_secs: default_cluster_refresh_interval(),
            cluster_load_retries: default_cluster_load_retries(),
            cluster_load_retry_delay_secs: default_cluster_load_retry_delay(),
            pricing_config_path: None,
            api_port: default_api_port(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and the optional config file.
    ///
    /// Environment variables override values from the file.
    pub fn load() -> Result<Self> {
        Self::load_from(std::env::var(CONFIG_FILE_ENV).ok().as_deref())
    }

    /// Load configuration, reading `file` first when given
    pub fn load_from(file: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::with_name(path));
        }

        let config = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("failed to read cost model configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("invalid cost model configuration")?;

        anyhow::ensure!(
            config.cluster_refresh_interval_secs > 0,
            "cluster_refresh_interval_secs must be greater than zero"
        );

        Ok(config)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn cluster_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.cluster_refresh_interval_secs)
    }

    pub fn cluster_load_retry_delay(&self) -> Duration {
        Duration::from_secs(self.cluster_load_retry_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.thanos_query_offset, "3h");
        assert_eq!(config.cluster_load_retries, 6);
        assert_eq!(config.cluster_load_retry_delay(), Duration::from_secs(10));
        assert_eq!(config.query_timeout(), Duration::from_secs(120));
        assert!(config.pricing_config_path.is_none());
        assert!(!config.thanos_enabled);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
cluster_id = "cluster-file"
prometheus_endpoint = "http://thanos-query:10902"
thanos_enabled = true
thanos_query_offset = "2h"
cluster_refresh_interval_secs = 60
pricing_config_path = "/var/configs/default.json"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path().to_str()).unwrap();

        assert_eq!(config.cluster_id, "cluster-file");
        assert_eq!(config.prometheus_endpoint, "http://thanos-query:10902");
        assert!(config.thanos_enabled);
        assert_eq!(config.thanos_query_offset, "2h");
        assert_eq!(config.cluster_refresh_interval(), Duration::from_secs(60));
        assert_eq!(
            config.pricing_config_path.as_deref(),
            Some("/var/configs/default.json")
        );
        assert_eq!(config.api_port, 9003);
    }

    #[test]
    fn test_load_from_rejects_zero_refresh_interval() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "cluster_refresh_interval_secs = 0").unwrap();

        let err = AppConfig::load_from(file.path().to_str()).unwrap_err();

        assert!(err.to_string().contains("cluster_refresh_interval_secs"));
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        assert!(AppConfig::load_from(Some("/nonexistent/cost-model")).is_err());
    }
}
