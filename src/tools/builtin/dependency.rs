//! Shared-dependency threshold search.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::Arc;

use crate::error::ToolError;
use crate::gateway::GraphGateway;
use crate::tools::builtin::flows::{default_types, FlowGraph, DEFAULT_FLOW_TYPES};
use crate::tools::{BoundArgs, ParamSpec, ParamType, Tool, ToolOutput, ToolSpec};
use crate::types::{Citation, GraphRecord, Renderable};

const PRODUCT_LABEL: &str = "Product";

/// Counts, per shared dependency node, how many distinct product nodes are
/// reachable downstream via flow relationships, and returns the dependencies
/// exceeding the caller's minimum.
pub struct SharedDependencyTool {
    gateway: Arc<dyn GraphGateway>,
    flow_types: Vec<String>,
}

impl SharedDependencyTool {
    pub fn new(gateway: Arc<dyn GraphGateway>) -> Self {
        Self {
            gateway,
            flow_types: default_types(DEFAULT_FLOW_TYPES),
        }
    }

    pub fn with_flow_types(mut self, flow_types: Vec<String>) -> Self {
        self.flow_types = flow_types;
        self
    }

    /// dependency node id -> distinct downstream product ids.
    ///
    /// Walks upstream from every product once; each upstream node reached
    /// depends into that product.
    fn count_products(graph: &FlowGraph) -> BTreeMap<String, BTreeSet<String>> {
        let mut by_dependency: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for product in graph
            .nodes()
            .filter(|node| node.labels.iter().any(|l| l == PRODUCT_LABEL))
        {
            let mut visited: HashSet<&str> = HashSet::from([product.id.as_str()]);
            let mut frontier: VecDeque<&str> = VecDeque::from([product.id.as_str()]);

            while let Some(here) = frontier.pop_front() {
                for &edge_index in graph.incoming(here) {
                    let upstream = graph.edge(edge_index).source.as_str();
                    if visited.insert(upstream) {
                        by_dependency
                            .entry(upstream.to_string())
                            .or_default()
                            .insert(product.id.clone());
                        frontier.push_back(upstream);
                    }
                }
            }
        }

        by_dependency
    }
}

#[async_trait]
impl Tool for SharedDependencyTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "shared_dependency_search",
            "Find dependency nodes that feed at least a minimum number of distinct \
             downstream products via flow relationships",
        )
        .with_param(ParamSpec::required(
            "min_products",
            ParamType::Integer,
            "Only report dependencies feeding at least this many products",
        ))
    }

    async fn execute(&self, args: &BoundArgs) -> Result<ToolOutput, ToolError> {
        let min_products = args.get_i64("min_products").ok_or_else(|| {
            ToolError::InvalidArguments(vec!["missing argument 'min_products'".to_string()])
        })?;
        if min_products < 1 {
            return Err(ToolError::InvalidArguments(vec![
                "min_products must be at least 1".to_string(),
            ]));
        }

        let graph = FlowGraph::fetch(self.gateway.as_ref(), &self.flow_types).await?;
        let by_dependency = Self::count_products(&graph);

        let mut shared: Vec<(&String, &BTreeSet<String>)> = by_dependency
            .iter()
            .filter(|(_, products)| products.len() as i64 >= min_products)
            .collect();
        // Heaviest fan-out first; name then id keeps ties deterministic.
        shared.sort_by(|(a_id, a_products), (b_id, b_products)| {
            b_products
                .len()
                .cmp(&a_products.len())
                .then_with(|| {
                    let a_name = graph.node(a_id).map(|n| n.name.as_str()).unwrap_or("");
                    let b_name = graph.node(b_id).map(|n| n.name.as_str()).unwrap_or("");
                    a_name.cmp(b_name)
                })
                .then_with(|| a_id.cmp(b_id))
        });

        let mut citations: Vec<Citation> = Vec::new();
        let mut cited = HashSet::new();
        let mut dependencies: Vec<Value> = Vec::new();
        let mut rows = Vec::new();

        for (dependency_id, products) in shared {
            let Some(dependency) = graph.node(dependency_id) else {
                continue;
            };
            let product_nodes: Vec<Value> = products
                .iter()
                .filter_map(|id| graph.node(id).map(|n| n.to_json()))
                .collect();
            dependencies.push(json!({
                "dependency": dependency.to_json(),
                "product_count": products.len(),
                "products": product_nodes,
            }));
            rows.push(GraphRecord::from_pairs(vec![
                ("dependency".to_string(), json!(dependency.name)),
                ("products_fed".to_string(), json!(products.len())),
            ]));

            if cited.insert(dependency_id.clone()) {
                citations.push(
                    dependency
                        .citation()
                        .with_property("product_count", products.len() as i64),
                );
            }
            for product_id in products {
                if cited.insert(product_id.clone()) {
                    if let Some(product) = graph.node(product_id) {
                        citations.push(product.citation());
                    }
                }
            }
        }

        let payload = json!({
            "min_products": min_products,
            "dependencies": dependencies,
        });
        let renderable = Renderable::table("Shared dependencies", &rows)
            .with_context("min_products", min_products);

        Ok(ToolOutput::new(payload)
            .with_citations(citations)
            .with_renderable(renderable))
    }
}
