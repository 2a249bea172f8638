//! Distribution-loop detection.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::ToolError;
use crate::gateway::GraphGateway;
use crate::tools::builtin::flows::{default_types, FlowGraph, DEFAULT_DISTRIBUTION_TYPES};
use crate::tools::{BoundArgs, ParamSpec, ParamType, Tool, ToolOutput, ToolSpec};
use crate::types::{Citation, Renderable};

const DEFAULT_MAX_DEPTH: i64 = 12;

/// Depth-first search over distribution relationships from a named product.
/// Revisiting a node already on the current path reports the full loop; the
/// depth bound guarantees termination on malformed or unbounded graphs.
/// Traversal state lives on an explicit stack, so the reachable depth is
/// limited by the caller's bound, not by the call stack.
pub struct DetectDistributionLoopsTool {
    gateway: Arc<dyn GraphGateway>,
    distribution_types: Vec<String>,
}

impl DetectDistributionLoopsTool {
    pub fn new(gateway: Arc<dyn GraphGateway>) -> Self {
        Self {
            gateway,
            distribution_types: default_types(DEFAULT_DISTRIBUTION_TYPES),
        }
    }

    pub fn with_distribution_types(mut self, distribution_types: Vec<String>) -> Self {
        self.distribution_types = distribution_types;
        self
    }

    fn search(
        graph: &FlowGraph,
        start: &str,
        max_depth: usize,
    ) -> Vec<(Vec<String>, Vec<usize>)> {
        let mut loops: Vec<(Vec<String>, Vec<usize>)> = Vec::new();
        let mut seen_loops: HashSet<Vec<String>> = HashSet::new();

        let mut path = vec![start.to_string()];
        let mut path_edges: Vec<usize> = Vec::new();
        let mut on_path: HashSet<String> = HashSet::from([start.to_string()]);
        // One cursor per path node, indexing into its outgoing edge list.
        let mut cursors: Vec<usize> = vec![0];

        while let Some(&cursor) = cursors.last() {
            let here = path.last().expect("path is never empty");
            let neighbors = graph.outgoing(here);

            if path.len() > max_depth || cursor >= neighbors.len() {
                cursors.pop();
                if cursors.is_empty() {
                    break;
                }
                let left = path.pop().expect("path is never empty");
                on_path.remove(&left);
                path_edges.pop();
                continue;
            }
            *cursors.last_mut().expect("cursor stack is non-empty") += 1;

            let edge_index = neighbors[cursor];
            let edge = graph.edge(edge_index);
            if on_path.contains(&edge.target) {
                // Closed a loop: everything from the first occurrence of the
                // target to the current node, in traversal order.
                let loop_start = path
                    .iter()
                    .position(|id| *id == edge.target)
                    .expect("target is on the current path");
                let cycle: Vec<String> = path[loop_start..].to_vec();
                if seen_loops.insert(canonical_rotation(&cycle)) {
                    let mut cycle_edges: Vec<usize> = path_edges[loop_start..].to_vec();
                    cycle_edges.push(edge_index);
                    loops.push((cycle, cycle_edges));
                }
                continue;
            }

            path.push(edge.target.clone());
            path_edges.push(edge_index);
            on_path.insert(edge.target.clone());
            cursors.push(0);
        }

        loops
    }
}

/// Rotate a cycle so its smallest node id comes first, giving every
/// traversal of the same loop an identical key.
fn canonical_rotation(cycle: &[String]) -> Vec<String> {
    let Some(min_position) = cycle
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(i, _)| i)
    else {
        return Vec::new();
    };
    let mut rotated = Vec::with_capacity(cycle.len());
    rotated.extend_from_slice(&cycle[min_position..]);
    rotated.extend_from_slice(&cycle[..min_position]);
    rotated
}

#[async_trait]
impl Tool for DetectDistributionLoopsTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "detect_distribution_loops",
            "Detect circular distribution chains reachable from a named product, \
             reporting each loop with its full node ordering",
        )
        .with_param(ParamSpec::required(
            "product",
            ParamType::String,
            "Name of the product node to start from",
        ))
        .with_param(ParamSpec::optional(
            "max_depth",
            ParamType::Integer,
            "Maximum traversal depth (default 12)",
        ))
    }

    async fn execute(&self, args: &BoundArgs) -> Result<ToolOutput, ToolError> {
        let product = args.require_str("product")?;
        let max_depth = args.get_i64("max_depth").unwrap_or(DEFAULT_MAX_DEPTH);
        if max_depth < 2 {
            return Err(ToolError::InvalidArguments(vec![
                "max_depth must be at least 2".to_string(),
            ]));
        }

        let graph = FlowGraph::fetch(self.gateway.as_ref(), &self.distribution_types).await?;
        let start = graph
            .resolve_name(product)
            .ok_or_else(|| ToolError::Execution(format!("no node named '{product}'")))?
            .id
            .clone();

        let found = Self::search(&graph, &start, max_depth as usize);

        let mut citations: Vec<Citation> = Vec::new();
        let mut cited = HashSet::new();
        let mut loops_json: Vec<Value> = Vec::new();
        let mut rows = Vec::new();

        for (cycle, edges) in &found {
            let nodes: Vec<Value> = cycle
                .iter()
                .filter_map(|id| graph.node(id).map(|n| n.to_json()))
                .collect();
            let names = cycle
                .iter()
                .filter_map(|id| graph.node(id).map(|n| n.name.as_str()))
                .collect::<Vec<_>>();
            loops_json.push(json!({ "length": cycle.len(), "nodes": nodes }));
            rows.push(crate::types::GraphRecord::from_pairs(vec![
                ("length".to_string(), json!(cycle.len())),
                (
                    "loop".to_string(),
                    json!(format!("{} -> {}", names.join(" -> "), names.first().copied().unwrap_or_default())),
                ),
            ]));

            for id in cycle {
                if cited.insert(id.clone()) {
                    if let Some(node) = graph.node(id) {
                        citations.push(node.citation());
                    }
                }
            }
            for &edge_index in edges {
                let edge = graph.edge(edge_index);
                if cited.insert(edge.id.clone()) {
                    citations.push(edge.citation());
                }
            }
        }

        let payload = json!({
            "product": product,
            "loops": loops_json,
        });
        let renderable = Renderable::table(format!("Distribution loops for {product}"), &rows);

        Ok(ToolOutput::new(payload)
            .with_citations(citations)
            .with_renderable(renderable))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_rotation_is_stable_across_entry_points() {
        let a = vec!["w2".to_string(), "w3".to_string(), "w1".to_string()];
        let b = vec!["w1".to_string(), "w2".to_string(), "w3".to_string()];
        assert_eq!(canonical_rotation(&a), canonical_rotation(&b));
    }
}
