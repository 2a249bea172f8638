//! Graph Query Gateway
//!
//! Thin client seam around the store's query-and-schema protocol. The store
//! is treated as an external service that tolerates concurrent readers;
//! nothing behind this trait ever mutates the graph.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GatewayError;
use crate::types::GraphRecord;

pub use http::HttpGateway;

/// Structural summary of the graph: label, relationship, and property
/// inventory. Cacheable for a session, refreshable on demand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSchema {
    pub node_labels: Vec<String>,
    pub relationship_types: Vec<String>,
    pub property_names: Vec<String>,
}

impl GraphSchema {
    /// Human-readable summary suitable for a system prompt.
    pub fn summary(&self) -> String {
        format!(
            "Node labels: {}\nRelationship types: {}\nProperty names: {}",
            self.node_labels.join(", "),
            self.relationship_types.join(", "),
            self.property_names.join(", "),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.node_labels.is_empty()
            && self.relationship_types.is_empty()
            && self.property_names.is_empty()
    }
}

/// Read-only query access to the supply-chain graph store.
///
/// Implementations perform no implicit retries; the dispatcher owns retry
/// policy for transient faults.
#[async_trait]
pub trait GraphGateway: Send + Sync {
    /// Run one parameterized read query and return its rows.
    async fn execute(&self, query: &str, params: Value) -> Result<Vec<GraphRecord>, GatewayError>;

    /// Return the (possibly cached) schema summary.
    async fn schema(&self) -> Result<GraphSchema, GatewayError>;

    /// Bypass the cache and refetch the schema from the store.
    async fn refresh_schema(&self) -> Result<GraphSchema, GatewayError>;
}
