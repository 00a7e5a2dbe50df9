//! Cost model library
//!
//! This crate provides the core functionality for:
//! - The self-refreshing cluster registry
//! - Node, volume, network and load balancer pricing
//! - Time-series backend queries
//! - Health checks and observability

pub mod cloud;
pub mod clusters;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod prom;

pub use clusters::{ClusterMap, ClusterMapBuilder, LocalClusterInfoProvider, PrometheusClusterMap};
pub use error::{ClusterInfoError, ConfigError, PricingError, QueryError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{CostModelMetrics, StructuredLogger};
