//! Error types for the cost model library

use std::num::ParseFloatError;
use thiserror::Error;

/// Errors returned by the time-series query layer
#[derive(Debug, Error)]
pub enum QueryError {
    /// The request could not be sent or the response body could not be read
    #[error("query request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The backend answered with a non-success HTTP status
    #[error("query backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The backend answered with `"status": "error"`
    #[error("query failed ({error_type}): {error}")]
    Backend { error_type: String, error: String },

    /// The response body did not match the expected envelope
    #[error("failed to decode query response: {0}")]
    Decode(String),

    /// The endpoint URL could not be parsed or joined
    #[error("invalid query endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    /// A result row does not carry the requested label
    #[error("label '{0}' is not present on query result")]
    MissingLabel(String),
}

/// Errors produced when building a cluster record from local identity data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterInfoError {
    #[error("local cluster info missing id")]
    MissingId,

    #[error("local cluster info missing name")]
    MissingName,
}

/// Errors produced by the pricing configuration store
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read pricing config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write pricing config {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse pricing config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize pricing config: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Errors produced by pricing providers
#[derive(Debug, Error)]
pub enum PricingError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The update payload was not a flat JSON object
    #[error("failed to decode pricing update: {0}")]
    Decode(#[source] serde_json::Error),

    /// A field in the update is not part of the pricing configuration
    #[error("unknown pricing field '{0}'")]
    UnknownField(String),

    /// A field in the update carried a non-string JSON value
    #[error("type error while updating config for {0}")]
    NonStringValue(String),

    /// A field value failed validation
    #[error("invalid value '{value}' for pricing field '{field}': {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// A configured rate could not be parsed as a number
    #[error("failed to parse {field} value '{value}': {source}")]
    Parse {
        field: &'static str,
        value: String,
        #[source]
        source: ParseFloatError,
    },

    /// The resolved feature tag has no row in the rate table
    #[error("no node pricing entry for features '{0}'")]
    MissingRate(String),
}
