//! HTTP client for the Prometheus query API
//!
//! Talks to `/api/v1/query` on a Prometheus server or a Thanos querier and
//! decodes the standard response envelope into [`QueryResult`] rows.

use super::{async_trait, offset_modifier, QueryClient, QueryResult, Sample, DEFAULT_THANOS_OFFSET};
use crate::error::QueryError;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

const QUERY_PATH: &str = "api/v1/query";

/// Kind of backend behind the endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendKind {
    /// Direct Prometheus server
    Prometheus,
    /// Thanos querier; queries are shifted back by `offset`
    Thanos { offset: String },
}

/// Prometheus response envelope
#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Option<ApiData>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
enum ApiData {
    Vector(Vec<VectorSeries>),
    Matrix(Vec<MatrixSeries>),
    Scalar(RawSample),
    String(RawSample),
}

#[derive(Debug, Deserialize)]
struct VectorSeries {
    #[serde(default)]
    metric: HashMap<String, String>,
    value: RawSample,
}

#[derive(Debug, Deserialize)]
struct MatrixSeries {
    #[serde(default)]
    metric: HashMap<String, String>,
    values: Vec<RawSample>,
}

/// `[<unix seconds>, "<value>"]`
type RawSample = (f64, String);

fn parse_sample((timestamp, value): RawSample) -> Result<Sample, QueryError> {
    let value = value
        .parse::<f64>()
        .map_err(|e| QueryError::Decode(format!("invalid sample value '{}': {}", value, e)))?;
    Ok(Sample { timestamp, value })
}

impl ApiData {
    fn into_results(self) -> Result<Vec<QueryResult>, QueryError> {
        match self {
            ApiData::Vector(series) => series
                .into_iter()
                .map(|s| {
                    Ok(QueryResult {
                        metric: s.metric,
                        values: vec![parse_sample(s.value)?],
                    })
                })
                .collect(),
            ApiData::Matrix(series) => series
                .into_iter()
                .map(|s| {
                    Ok(QueryResult {
                        metric: s.metric,
                        values: s
                            .values
                            .into_iter()
                            .map(parse_sample)
                            .collect::<Result<_, _>>()?,
                    })
                })
                .collect(),
            ApiData::Scalar(sample) | ApiData::String(sample) => Ok(vec![QueryResult {
                metric: HashMap::new(),
                values: vec![parse_sample(sample)?],
            }]),
        }
    }
}

/// Query client for Prometheus-compatible HTTP APIs
pub struct PrometheusClient {
    http: Client,
    endpoint: Url,
    kind: BackendKind,
}

impl PrometheusClient {
    /// Get the endpoint URL
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Get the backend kind
    pub fn kind(&self) -> &BackendKind {
        &self.kind
    }

    fn query_url(&self, query: &str) -> Result<Url, QueryError> {
        let mut url = self.endpoint.join(QUERY_PATH)?;
        url.query_pairs_mut().append_pair("query", query);
        Ok(url)
    }

    fn decode(body: &str) -> Result<Vec<QueryResult>, QueryError> {
        let response: ApiResponse =
            serde_json::from_str(body).map_err(|e| QueryError::Decode(e.to_string()))?;

        if response.status != "success" {
            return Err(QueryError::Backend {
                error_type: response.error_type.unwrap_or_default(),
                error: response.error.unwrap_or_default(),
            });
        }

        response
            .data
            .ok_or_else(|| QueryError::Decode("response is missing data".to_string()))?
            .into_results()
    }
}

#[async_trait]
impl QueryClient for PrometheusClient {
    async fn query(&self, query: &str) -> Result<Vec<QueryResult>, QueryError> {
        let url = self.query_url(query)?;
        debug!(query = %query, "Running time-series query");

        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|source| QueryError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| QueryError::Transport {
            url: url.to_string(),
            source,
        })?;

        if !status.is_success() {
            // Prometheus reports query errors with 4xx/5xx and an error envelope
            return match Self::decode(&body) {
                Err(e @ QueryError::Backend { .. }) => Err(e),
                _ => Err(QueryError::Status {
                    status: status.as_u16(),
                    body,
                }),
            };
        }

        Self::decode(&body)
    }

    fn query_offset(&self) -> String {
        match &self.kind {
            BackendKind::Prometheus => String::new(),
            BackendKind::Thanos { offset } => offset_modifier(offset),
        }
    }
}

/// Builder for [`PrometheusClient`]
pub struct PrometheusClientBuilder {
    endpoint: Option<String>,
    timeout: Duration,
    kind: BackendKind,
}

impl PrometheusClientBuilder {
    pub fn new() -> Self {
        Self {
            endpoint: None,
            timeout: Duration::from_secs(120),
            kind: BackendKind::Prometheus,
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Treat the endpoint as a Thanos querier using the given offset
    pub fn thanos(mut self, offset: impl Into<String>) -> Self {
        let offset = offset.into();
        self.kind = BackendKind::Thanos {
            offset: if offset.is_empty() {
                DEFAULT_THANOS_OFFSET.to_string()
            } else {
                offset
            },
        };
        self
    }

    pub fn build(self) -> Result<PrometheusClient, QueryError> {
        let raw = self
            .endpoint
            .ok_or_else(|| QueryError::Decode("endpoint is required".to_string()))?;

        let mut endpoint = Url::parse(&raw)?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        let http = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|source| QueryError::Transport {
                url: raw.clone(),
                source,
            })?;

        Ok(PrometheusClient {
            http,
            endpoint,
            kind: self.kind,
        })
    }
}

impl Default for PrometheusClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
