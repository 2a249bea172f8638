//! Shared flow-graph plumbing for the analytical tools.
//!
//! Every traversal tool fetches edges through the same parameterized
//! template and runs its algorithm over the in-memory adjacency built here,
//! so citations always come from rows the gateway actually returned.

use serde_json::{json, Value};
use std::collections::HashMap;

use crate::error::ToolError;
use crate::gateway::GraphGateway;
use crate::types::{Citation, GraphRecord};

/// Relationship types treated as material/product movement by default.
pub const DEFAULT_FLOW_TYPES: &[&str] = &["SUPPLIES", "MANUFACTURES", "DELIVERS_TO", "DISTRIBUTES"];

/// Relationship types treated as distribution legs by default.
pub const DEFAULT_DISTRIBUTION_TYPES: &[&str] = &["DISTRIBUTES", "DELIVERS_TO"];

/// Single edge-list fetch shared by the traversal tools.
pub const FLOW_EDGES_QUERY: &str = "MATCH (a)-[r]->(b) WHERE type(r) IN $relationship_types \
     RETURN elementId(a) AS source_id, a.name AS source_name, labels(a) AS source_labels, \
     elementId(r) AS relationship_id, type(r) AS relationship_type, \
     elementId(b) AS target_id, b.name AS target_name, labels(b) AS target_labels";

#[derive(Debug, Clone)]
pub struct FlowNode {
    pub id: String,
    pub name: String,
    pub labels: Vec<String>,
}

impl FlowNode {
    pub fn citation(&self) -> Citation {
        Citation::node(&self.id)
            .with_property("name", self.name.clone())
            .with_property("labels", self.labels.clone())
    }

    pub fn to_json(&self) -> Value {
        json!({ "id": self.id, "name": self.name, "labels": self.labels })
    }
}

#[derive(Debug, Clone)]
pub struct FlowEdge {
    pub id: String,
    pub relationship_type: String,
    pub source: String,
    pub target: String,
}

impl FlowEdge {
    pub fn citation(&self) -> Citation {
        Citation::relationship(&self.id).with_property("type", self.relationship_type.clone())
    }
}

/// In-memory adjacency over one fetched edge list.
#[derive(Debug, Default)]
pub struct FlowGraph {
    nodes: HashMap<String, FlowNode>,
    edges: Vec<FlowEdge>,
    outgoing: HashMap<String, Vec<usize>>,
    incoming: HashMap<String, Vec<usize>>,
}

impl FlowGraph {
    /// Fetch all edges of the given relationship types and index them.
    pub async fn fetch(
        gateway: &dyn GraphGateway,
        relationship_types: &[String],
    ) -> Result<Self, ToolError> {
        let records = gateway
            .execute(
                FLOW_EDGES_QUERY,
                json!({ "relationship_types": relationship_types }),
            )
            .await?;

        let mut graph = FlowGraph::default();
        for record in &records {
            graph.ingest(record);
        }

        // Deterministic traversal independent of row order.
        for neighbors in graph.outgoing.values_mut() {
            neighbors.sort_by(|a, b| {
                let a = &graph.nodes[&graph.edges[*a].target].name;
                let b = &graph.nodes[&graph.edges[*b].target].name;
                a.cmp(b)
            });
        }
        for neighbors in graph.incoming.values_mut() {
            neighbors.sort_by(|a, b| {
                let a = &graph.nodes[&graph.edges[*a].source].name;
                let b = &graph.nodes[&graph.edges[*b].source].name;
                a.cmp(b)
            });
        }

        Ok(graph)
    }

    fn ingest(&mut self, record: &GraphRecord) {
        let (Some(source_id), Some(target_id), Some(relationship_id)) = (
            record.get_str("source_id"),
            record.get_str("target_id"),
            record.get_str("relationship_id"),
        ) else {
            return;
        };

        for (id_col, name_col, labels_col) in [
            ("source_id", "source_name", "source_labels"),
            ("target_id", "target_name", "target_labels"),
        ] {
            let id = record.get_str(id_col).unwrap_or_default().to_string();
            self.nodes.entry(id.clone()).or_insert_with(|| FlowNode {
                id,
                name: record.get_str(name_col).unwrap_or_default().to_string(),
                labels: string_list(record.get(labels_col)),
            });
        }

        let edge_index = self.edges.len();
        self.edges.push(FlowEdge {
            id: relationship_id.to_string(),
            relationship_type: record
                .get_str("relationship_type")
                .unwrap_or_default()
                .to_string(),
            source: source_id.to_string(),
            target: target_id.to_string(),
        });
        self.outgoing
            .entry(source_id.to_string())
            .or_default()
            .push(edge_index);
        self.incoming
            .entry(target_id.to_string())
            .or_default()
            .push(edge_index);
    }

    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &FlowNode> {
        self.nodes.values()
    }

    pub fn edge(&self, index: usize) -> &FlowEdge {
        &self.edges[index]
    }

    pub fn outgoing(&self, id: &str) -> &[usize] {
        self.outgoing.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn incoming(&self, id: &str) -> &[usize] {
        self.incoming.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Case-insensitive exact match on the `name` property.
    pub fn resolve_name(&self, name: &str) -> Option<&FlowNode> {
        let mut matches: Vec<&FlowNode> = self
            .nodes
            .values()
            .filter(|node| node.name.eq_ignore_ascii_case(name))
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        matches.into_iter().next()
    }
}

pub fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub fn default_types(types: &[&str]) -> Vec<String> {
    types.iter().map(|t| t.to_string()).collect()
}
