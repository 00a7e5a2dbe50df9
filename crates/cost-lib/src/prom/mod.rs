//! Time-series query layer
//!
//! This module provides the seam between the cluster registry and the
//! metrics backend it reads from. It supports plain Prometheus as well as
//! Thanos, which needs an offset modifier because recent samples are not
//! available from long-term storage yet.

mod client;
mod retry;

pub use client::{BackendKind, PrometheusClient, PrometheusClientBuilder};
pub use retry::retry;

use crate::error::QueryError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use async_trait::async_trait;

/// Default offset applied to Thanos queries
pub const DEFAULT_THANOS_OFFSET: &str = "3h";

/// A single sample of a query result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: f64,
    pub value: f64,
}

/// One series returned by an instant or range query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Label set of the series
    pub metric: HashMap<String, String>,
    /// Samples in timestamp order
    pub values: Vec<Sample>,
}

impl QueryResult {
    /// Create a result row from a label set with no samples
    pub fn from_labels<I, K, V>(labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            metric: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            values: Vec::new(),
        }
    }

    /// Get a label value, failing if the label is absent
    pub fn get_string(&self, label: &str) -> Result<&str, QueryError> {
        self.metric
            .get(label)
            .map(String::as_str)
            .ok_or_else(|| QueryError::MissingLabel(label.to_string()))
    }
}

/// Trait for time-series backends the registry can query
#[async_trait]
pub trait QueryClient: Send + Sync {
    /// Run an instant query and return all result series
    async fn query(&self, query: &str) -> Result<Vec<QueryResult>, QueryError>;

    /// Offset modifier appended to queries (empty for direct sources)
    fn query_offset(&self) -> String {
        String::new()
    }
}

/// Format an offset duration as a PromQL offset modifier
pub fn offset_modifier(offset: &str) -> String {
    if offset.is_empty() {
        String::new()
    } else {
        format!(" offset {}", offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_string_present_and_missing() {
        let row = QueryResult::from_labels([("id", "cluster-one"), ("name", "")]);

        assert_eq!(row.get_string("id").unwrap(), "cluster-one");
        assert_eq!(row.get_string("name").unwrap(), "");
        assert!(matches!(
            row.get_string("provider"),
            Err(QueryError::MissingLabel(label)) if label == "provider"
        ));
    }

    #[test]
    fn test_offset_modifier() {
        assert_eq!(offset_modifier(""), "");
        assert_eq!(offset_modifier("3h"), " offset 3h");
    }
}
