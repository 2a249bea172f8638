//! Supply-path tracing over flow relationships.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::ToolError;
use crate::gateway::GraphGateway;
use crate::tools::builtin::flows::{default_types, FlowGraph, DEFAULT_FLOW_TYPES};
use crate::tools::{BoundArgs, ParamSpec, ParamType, Tool, ToolOutput, ToolSpec};
use crate::types::{Citation, Renderable};

const DEFAULT_MAX_HOPS: i64 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Upstream,
    Downstream,
}

/// Breadth-first trace from a named product to every reachable endpoint of
/// its supply chains, one path per distinct chain.
pub struct TraceSupplyPathsTool {
    gateway: Arc<dyn GraphGateway>,
    flow_types: Vec<String>,
}

impl TraceSupplyPathsTool {
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

    /// Enumerate simple paths breadth-first. A path terminates where the
    /// traversal direction has no unvisited continuation or the hop budget
    /// runs out.
    fn trace(
        graph: &FlowGraph,
        start: &str,
        direction: Direction,
        max_hops: usize,
    ) -> Vec<(Vec<String>, Vec<usize>)> {
        let mut complete = Vec::new();
        let mut frontier: VecDeque<(Vec<String>, Vec<usize>)> =
            VecDeque::from([(vec![start.to_string()], Vec::new())]);

        while let Some((path, edges)) = frontier.pop_front() {
            let here = path.last().expect("path is never empty");
            let neighbors = match direction {
                Direction::Downstream => graph.outgoing(here),
                Direction::Upstream => graph.incoming(here),
            };

            let mut extended = false;
            if path.len() <= max_hops {
                for &edge_index in neighbors {
                    let edge = graph.edge(edge_index);
                    let next = match direction {
                        Direction::Downstream => &edge.target,
                        Direction::Upstream => &edge.source,
                    };
                    if path.contains(next) {
                        continue;
                    }
                    let mut next_path = path.clone();
                    next_path.push(next.clone());
                    let mut next_edges = edges.clone();
                    next_edges.push(edge_index);
                    frontier.push_back((next_path, next_edges));
                    extended = true;
                }
            }

            // The start node alone is not a chain.
            if !extended && path.len() > 1 {
                complete.push((path, edges));
            }
        }

        complete
    }
}

#[async_trait]
impl Tool for TraceSupplyPathsTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "trace_supply_paths",
            "Trace every distinct supply chain from a named product to its upstream \
             suppliers or downstream distributors, following flow relationships",
        )
        .with_param(ParamSpec::required(
            "product",
            ParamType::String,
            "Name of the product node to trace from",
        ))
        .with_param(ParamSpec::optional(
            "direction",
            ParamType::String,
            "Traversal direction: 'upstream', 'downstream', or 'both' (default)",
        ))
        .with_param(ParamSpec::optional(
            "max_hops",
            ParamType::Integer,
            "Maximum chain length in hops (default 6)",
        ))
    }

    async fn execute(&self, args: &BoundArgs) -> Result<ToolOutput, ToolError> {
        let product = args.require_str("product")?;
        let directions = match args.get_str("direction").unwrap_or("both") {
            "upstream" => vec![Direction::Upstream],
            "downstream" => vec![Direction::Downstream],
            "both" => vec![Direction::Upstream, Direction::Downstream],
            other => {
                return Err(ToolError::InvalidArguments(vec![format!(
                    "direction must be 'upstream', 'downstream', or 'both', got '{other}'"
                )]));
            }
        };
        let max_hops = args.get_i64("max_hops").unwrap_or(DEFAULT_MAX_HOPS);
        if max_hops < 1 {
            return Err(ToolError::InvalidArguments(vec![
                "max_hops must be at least 1".to_string(),
            ]));
        }

        let graph = FlowGraph::fetch(self.gateway.as_ref(), &self.flow_types).await?;
        let start = graph
            .resolve_name(product)
            .ok_or_else(|| ToolError::Execution(format!("no node named '{product}'")))?
            .id
            .clone();

        let mut traced = Vec::new();
        for direction in directions {
            for (path, edges) in Self::trace(&graph, &start, direction, max_hops as usize) {
                traced.push((direction, path, edges));
            }
        }

        // Shortest chains first, then lexicographic on node names.
        traced.sort_by(|a, b| {
            let names = |(_, path, _): &(Direction, Vec<String>, Vec<usize>)| -> Vec<String> {
                path.iter()
                    .map(|id| graph.node(id).map(|n| n.name.clone()).unwrap_or_default())
                    .collect()
            };
            a.1.len().cmp(&b.1.len()).then_with(|| names(a).cmp(&names(b)))
        });

        let mut citations: Vec<Citation> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut paths_json = Vec::new();
        let mut rows = Vec::new();

        for (direction, path, edges) in &traced {
            let nodes: Vec<Value> = path
                .iter()
                .filter_map(|id| graph.node(id).map(|n| n.to_json()))
                .collect();
            let chain = path
                .iter()
                .filter_map(|id| graph.node(id).map(|n| n.name.as_str()))
                .collect::<Vec<_>>()
                .join(" -> ");
            let direction_name = match direction {
                Direction::Upstream => "upstream",
                Direction::Downstream => "downstream",
            };
            paths_json.push(json!({
                "direction": direction_name,
                "length": path.len() - 1,
                "nodes": nodes,
            }));
            rows.push(crate::types::GraphRecord::from_pairs(vec![
                ("direction".to_string(), json!(direction_name)),
                ("hops".to_string(), json!(path.len() - 1)),
                ("chain".to_string(), json!(chain)),
            ]));

            for id in path {
                if seen.insert(id.clone()) {
                    if let Some(node) = graph.node(id) {
                        citations.push(node.citation());
                    }
                }
            }
            for &edge_index in edges {
                let edge = graph.edge(edge_index);
                if seen.insert(edge.id.clone()) {
                    citations.push(edge.citation());
                }
            }
        }

        let payload = json!({
            "product": product,
            "paths": paths_json,
        });
        let renderable = Renderable::table(format!("Supply chains for {product}"), &rows);

        Ok(ToolOutput::new(payload)
            .with_citations(citations)
            .with_renderable(renderable))
    }
}
