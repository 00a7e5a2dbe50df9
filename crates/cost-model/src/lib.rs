//! Cost model service
//!
//! Configuration loading and the HTTP API that exposes the cluster registry
//! and the pricing provider.

pub mod api;
pub mod config;
