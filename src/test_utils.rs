//! In-memory graph store double and a shared supply-chain fixture.
//!
//! The double answers the exact query templates the production code sends,
//! so tools run unmodified against it. It counts calls and records every
//! element id it returns, letting tests assert that citations only ever
//! point at data the store actually served.

use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::gateway::{GraphGateway, GraphSchema};
use crate::index::document_fetch_query;
use crate::tools::builtin::concentration::{APPROVED_SUPPLY_QUERY, MATERIAL_NODES_QUERY};
use crate::tools::builtin::flows::FLOW_EDGES_QUERY;
use crate::tools::builtin::name_search::NODE_LOOKUP_QUERY;
use crate::types::GraphRecord;

#[derive(Debug, Clone)]
pub struct MemoryNode {
    pub id: String,
    pub labels: Vec<String>,
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct MemoryRelationship {
    pub id: String,
    pub rel_type: String,
    pub source: String,
    pub target: String,
    pub properties: Map<String, Value>,
}

#[derive(Default)]
pub struct MemoryGateway {
    nodes: Vec<MemoryNode>,
    relationships: Vec<MemoryRelationship>,
    call_count: AtomicUsize,
    fail_next: AtomicUsize,
    returned_ids: Mutex<HashSet<String>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: &str, name: &str, labels: &[&str]) {
        let mut properties = Map::new();
        properties.insert("name".to_string(), json!(name));
        self.nodes.push(MemoryNode {
            id: id.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            properties,
        });
    }

    pub fn add_relationship(&mut self, id: &str, rel_type: &str, source: &str, target: &str) {
        self.add_relationship_with(id, rel_type, source, target, Map::new());
    }

    pub fn add_relationship_with(
        &mut self,
        id: &str,
        rel_type: &str,
        source: &str,
        target: &str,
        properties: Map<String, Value>,
    ) {
        self.relationships.push(MemoryRelationship {
            id: id.to_string(),
            rel_type: rel_type.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            properties,
        });
    }

    /// Make the next `count` calls fail with a connection fault before
    /// succeeding, to exercise the retry path.
    pub fn fail_next_with_connection(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// How many queries actually reached the store.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Every element id the store has returned so far.
    pub fn returned_ids(&self) -> HashSet<String> {
        self.returned_ids
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn node(&self, id: &str) -> Option<&MemoryNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    fn nodes_by_id(&self) -> HashMap<&str, &MemoryNode> {
        self.nodes.iter().map(|n| (n.id.as_str(), n)).collect()
    }

    fn record_ids<'a>(&self, ids: impl IntoIterator<Item = &'a str>) {
        let mut guard = self
            .returned_ids
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for id in ids {
            guard.insert(id.to_string());
        }
    }

    fn flow_edges(&self, params: &Value) -> Vec<GraphRecord> {
        let wanted: HashSet<&str> = params["relationship_types"]
            .as_array()
            .map(|types| types.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let by_id = self.nodes_by_id();
        let mut rows = Vec::new();
        for rel in &self.relationships {
            if !wanted.contains(rel.rel_type.as_str()) {
                continue;
            }
            let (Some(&source), Some(&target)) = (
                by_id.get(rel.source.as_str()),
                by_id.get(rel.target.as_str()),
            ) else {
                continue;
            };
            self.record_ids([source.id.as_str(), rel.id.as_str(), target.id.as_str()]);
            rows.push(GraphRecord::from_pairs(vec![
                ("source_id".to_string(), json!(source.id)),
                ("source_name".to_string(), source.properties["name"].clone()),
                ("source_labels".to_string(), json!(source.labels)),
                ("relationship_id".to_string(), json!(rel.id)),
                ("relationship_type".to_string(), json!(rel.rel_type)),
                ("target_id".to_string(), json!(target.id)),
                ("target_name".to_string(), target.properties["name"].clone()),
                ("target_labels".to_string(), json!(target.labels)),
            ]));
        }
        rows
    }

    fn approved_supply(&self) -> Vec<GraphRecord> {
        let mut rows = Vec::new();
        for rel in &self.relationships {
            if rel.rel_type != "SUPPLIES" {
                continue;
            }
            if !rel.properties.get("approved").and_then(Value::as_bool).unwrap_or(false) {
                continue;
            }
            let (Some(supplier), Some(material)) = (self.node(&rel.source), self.node(&rel.target))
            else {
                continue;
            };
            if !supplier.labels.iter().any(|l| l == "Supplier") {
                continue;
            }
            if !material
                .labels
                .iter()
                .any(|l| l == "RawMaterial" || l == "API")
            {
                continue;
            }
            self.record_ids([material.id.as_str(), supplier.id.as_str(), rel.id.as_str()]);
            rows.push(GraphRecord::from_pairs(vec![
                ("material_id".to_string(), json!(material.id)),
                (
                    "material_name".to_string(),
                    material.properties["name"].clone(),
                ),
                ("material_labels".to_string(), json!(material.labels)),
                ("supplier_id".to_string(), json!(supplier.id)),
                (
                    "supplier_name".to_string(),
                    supplier.properties["name"].clone(),
                ),
                ("relationship_id".to_string(), json!(rel.id)),
            ]));
        }
        rows
    }

    fn material_nodes(&self) -> Vec<GraphRecord> {
        let mut rows = Vec::new();
        for node in &self.nodes {
            if !node
                .labels
                .iter()
                .any(|l| l == "RawMaterial" || l == "API")
            {
                continue;
            }
            self.record_ids([node.id.as_str()]);
            rows.push(GraphRecord::from_pairs(vec![
                ("material_id".to_string(), json!(node.id)),
                ("material_name".to_string(), node.properties["name"].clone()),
                ("material_labels".to_string(), json!(node.labels)),
            ]));
        }
        rows
    }

    fn node_lookup(&self, params: &Value) -> Vec<GraphRecord> {
        let wanted: Vec<&str> = params["node_ids"]
            .as_array()
            .map(|ids| ids.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut rows = Vec::new();
        for id in wanted {
            let Some(node) = self.node(id) else {
                continue;
            };
            self.record_ids([node.id.as_str()]);
            rows.push(GraphRecord::from_pairs(vec![
                ("node_id".to_string(), json!(node.id)),
                ("labels".to_string(), json!(node.labels)),
                ("name".to_string(), node.properties["name"].clone()),
            ]));
        }
        rows
    }

    fn document_fetch(&self, query: &str) -> Option<Vec<GraphRecord>> {
        let label = query.strip_prefix("MATCH (n:`")?.split('`').next()?;
        let fields: Vec<&str> = query
            .split("n.`")
            .skip(1)
            .filter_map(|rest| rest.split('`').next())
            .collect();
        if query != document_fetch_query(label, &fields.iter().map(|f| f.to_string()).collect::<Vec<_>>()) {
            return None;
        }

        let mut rows = Vec::new();
        for node in self
            .nodes
            .iter()
            .filter(|n| n.labels.iter().any(|l| l == label))
        {
            self.record_ids([node.id.as_str()]);
            let mut pairs = vec![("node_id".to_string(), json!(node.id))];
            for (i, field) in fields.iter().enumerate() {
                pairs.push((
                    format!("field_{i}"),
                    node.properties.get(*field).cloned().unwrap_or(Value::Null),
                ));
            }
            rows.push(GraphRecord::from_pairs(pairs));
        }
        Some(rows)
    }
}

#[async_trait]
impl GraphGateway for MemoryGateway {
    async fn execute(&self, query: &str, params: Value) -> Result<Vec<GraphRecord>, GatewayError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        let pending = self.fail_next.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_next.store(pending - 1, Ordering::SeqCst);
            return Err(GatewayError::Connection("injected fault".to_string()));
        }

        if query == FLOW_EDGES_QUERY {
            return Ok(self.flow_edges(&params));
        }
        if query == MATERIAL_NODES_QUERY {
            return Ok(self.material_nodes());
        }
        if query == APPROVED_SUPPLY_QUERY {
            return Ok(self.approved_supply());
        }
        if query == NODE_LOOKUP_QUERY {
            return Ok(self.node_lookup(&params));
        }
        if let Some(rows) = self.document_fetch(query) {
            return Ok(rows);
        }
        Err(GatewayError::Query(format!(
            "memory gateway does not recognize this statement: {query}"
        )))
    }

    async fn schema(&self) -> Result<GraphSchema, GatewayError> {
        let mut node_labels: Vec<String> = self
            .nodes
            .iter()
            .flat_map(|n| n.labels.iter().cloned())
            .collect();
        node_labels.sort();
        node_labels.dedup();

        let mut relationship_types: Vec<String> = self
            .relationships
            .iter()
            .map(|r| r.rel_type.clone())
            .collect();
        relationship_types.sort();
        relationship_types.dedup();

        let mut property_names: Vec<String> = self
            .nodes
            .iter()
            .flat_map(|n| n.properties.keys().cloned())
            .chain(
                self.relationships
                    .iter()
                    .flat_map(|r| r.properties.keys().cloned()),
            )
            .collect();
        property_names.sort();
        property_names.dedup();

        Ok(GraphSchema {
            node_labels,
            relationship_types,
            property_names,
        })
    }

    async fn refresh_schema(&self) -> Result<GraphSchema, GatewayError> {
        self.schema().await
    }
}

/// Small but structurally complete supply chain.
///
/// Two products share upstream suppliers, one raw material has a single
/// approved supplier, and the downstream distribution network contains
/// exactly one three-node loop reachable from "Coldarex".
pub fn sample_supply_chain() -> MemoryGateway {
    let mut gateway = MemoryGateway::new();

    gateway.add_node("p1", "Coldarex", &["Product", "Entity"]);
    gateway.add_node("p2", "Febrilex", &["Product", "Entity"]);
    gateway.add_node("a1", "Paracetamol API", &["API", "Entity"]);
    gateway.add_node("a2", "Ibuprofen API", &["API", "Entity"]);
    gateway.add_node("r1", "Acetic Anhydride", &["RawMaterial", "Entity"]);
    gateway.add_node("r2", "PNCB", &["RawMaterial", "Entity"]);
    gateway.add_node("s1", "Dilip Chemicals Pvt Ltd", &["Supplier", "Entity"]);
    gateway.add_node("s3", "Sunrise Pharma", &["Supplier", "Entity"]);
    gateway.add_node("d1", "Dilip Distribution GmbH", &["Distributor", "Entity"]);
    gateway.add_node("w1", "Warsaw Depot", &["Distributor", "Entity"]);
    gateway.add_node("w2", "Vienna Depot", &["Distributor", "Entity"]);
    gateway.add_node("w3", "Zagreb Depot", &["Distributor", "Entity"]);

    let approved = |value: bool| {
        let mut props = Map::new();
        props.insert("approved".to_string(), json!(value));
        props
    };

    // Upstream: r1 depends on a single approved supplier, r2 on two.
    gateway.add_relationship_with("e1", "SUPPLIES", "s1", "r1", approved(true));
    gateway.add_relationship_with("e2", "SUPPLIES", "s1", "r2", approved(true));
    gateway.add_relationship_with("e3", "SUPPLIES", "s3", "r2", approved(true));
    gateway.add_relationship("e4", "SUPPLIES", "r1", "a1");
    gateway.add_relationship("e5", "SUPPLIES", "r2", "a1");
    gateway.add_relationship("e6", "SUPPLIES", "r2", "a2");
    gateway.add_relationship("e7", "MANUFACTURES", "a1", "p1");
    gateway.add_relationship("e8", "MANUFACTURES", "a2", "p2");

    // Downstream distribution, including one depot loop.
    gateway.add_relationship("e9", "DISTRIBUTES", "p1", "d1");
    gateway.add_relationship("e10", "DELIVERS_TO", "d1", "w1");
    gateway.add_relationship("e11", "DISTRIBUTES", "w1", "w2");
    gateway.add_relationship("e12", "DISTRIBUTES", "w2", "w3");
    gateway.add_relationship("e13", "DELIVERS_TO", "w3", "w1");

    gateway
}
