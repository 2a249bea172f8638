//! Fuzzy name lookup backed by the shared full-text index.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::ToolError;
use crate::gateway::GraphGateway;
use crate::index::IndexManager;
use crate::tools::builtin::flows::string_list;
use crate::tools::{BoundArgs, ParamSpec, ParamType, Tool, ToolOutput, ToolSpec};
use crate::types::{Citation, GraphRecord, Renderable};

/// Fetch display properties for ranked index hits; the returned rows are
/// what the citations point at.
pub const NODE_LOOKUP_QUERY: &str = "MATCH (n) WHERE elementId(n) IN $node_ids \
     RETURN elementId(n) AS node_id, labels(n) AS labels, n.name AS name";

/// Search node names through the full-text index. Supports the index
/// expression grammar: `term`, `term*`, `?erm`/`ter?`, `term~`, "a phrase".
pub struct NameSearchTool {
    gateway: Arc<dyn GraphGateway>,
    index: Arc<IndexManager>,
    index_name: String,
    default_top_k: usize,
}

impl NameSearchTool {
    pub fn new(
        gateway: Arc<dyn GraphGateway>,
        index: Arc<IndexManager>,
        index_name: impl Into<String>,
        default_top_k: usize,
    ) -> Self {
        Self {
            gateway,
            index,
            index_name: index_name.into(),
            default_top_k,
        }
    }
}

#[async_trait]
impl Tool for NameSearchTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "search_on_name",
            "Search the graph by name using the full-text index. Supports wildcard \
             ('dilip*'), single-character ('?ilip'), fuzzy ('dilip~'), and quoted \
             phrase expressions; matching is case-insensitive",
        )
        .with_param(ParamSpec::required(
            "name",
            ParamType::String,
            "Search expression to look for",
        ))
        .with_param(ParamSpec::optional(
            "limit",
            ParamType::Integer,
            "Maximum number of nodes to return (default 10)",
        ))
    }

    async fn execute(&self, args: &BoundArgs) -> Result<ToolOutput, ToolError> {
        let expression = args.require_str("name")?;
        let limit = match args.get_i64("limit") {
            Some(limit) if limit < 1 => {
                return Err(ToolError::InvalidArguments(vec![
                    "limit must be at least 1".to_string(),
                ]));
            }
            Some(limit) => limit as usize,
            None => self.default_top_k,
        };

        let hits = self.index.query(&self.index_name, expression, limit)?;
        if hits.is_empty() {
            return Ok(ToolOutput::new(json!({
                "expression": expression,
                "matches": [],
            })));
        }

        let node_ids: Vec<&str> = hits.iter().map(|h| h.node_id.as_str()).collect();
        let records = self
            .gateway
            .execute(NODE_LOOKUP_QUERY, json!({ "node_ids": node_ids }))
            .await?;

        let mut citations: Vec<Citation> = Vec::new();
        let mut matches: Vec<Value> = Vec::new();
        let mut rows = Vec::new();

        // Keep index rank order, merging in the fetched display properties.
        for hit in &hits {
            let Some(record) = records
                .iter()
                .find(|r| r.get_str("node_id") == Some(hit.node_id.as_str()))
            else {
                continue;
            };
            let name = record.get_str("name").unwrap_or_default();
            let labels = string_list(record.get("labels"));

            matches.push(json!({
                "node_id": hit.node_id,
                "name": name,
                "labels": labels,
                "score": hit.score,
            }));
            rows.push(GraphRecord::from_pairs(vec![
                ("name".to_string(), json!(name)),
                ("labels".to_string(), json!(labels.join(", "))),
                ("score".to_string(), json!(hit.score)),
            ]));
            citations.push(
                Citation::node(&hit.node_id)
                    .with_property("name", name)
                    .with_property("labels", labels),
            );
        }

        let payload = json!({
            "expression": expression,
            "matches": matches,
        });
        let renderable =
            Renderable::table(format!("Name matches for '{expression}'"), &rows);

        Ok(ToolOutput::new(payload)
            .with_citations(citations)
            .with_renderable(renderable))
    }
}
