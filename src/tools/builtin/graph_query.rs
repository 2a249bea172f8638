//! Raw read-only query pass-through and schema introspection.

use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::ToolError;
use crate::gateway::GraphGateway;
use crate::tools::{BoundArgs, ParamSpec, ParamType, Tool, ToolOutput, ToolSpec};
use crate::types::Renderable;

const WRITE_CLAUSES: &str =
    r"\b(create|merge|delete|detach|set|remove|drop|foreach|load\s+csv)\b";

/// Execute an arbitrary read-only graph query. The system never mutates the
/// store, so mutating clauses are rejected before reaching the gateway.
pub struct ReadGraphQueryTool {
    gateway: Arc<dyn GraphGateway>,
    write_guard: regex::Regex,
}

impl ReadGraphQueryTool {
    pub fn new(gateway: Arc<dyn GraphGateway>) -> Self {
        let write_guard = RegexBuilder::new(WRITE_CLAUSES)
            .case_insensitive(true)
            .build()
            .expect("write-clause pattern is valid");
        Self {
            gateway,
            write_guard,
        }
    }
}

#[async_trait]
impl Tool for ReadGraphQueryTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "read_graph_query",
            "Run a read-only graph query with named parameters and return the \
             resulting rows. Mutating clauses are rejected",
        )
        .with_param(ParamSpec::required(
            "query",
            ParamType::String,
            "The read-only query to execute",
        ))
        .with_param(ParamSpec::optional(
            "parameters",
            ParamType::Object,
            "Named query parameters",
        ))
    }

    async fn execute(&self, args: &BoundArgs) -> Result<ToolOutput, ToolError> {
        let query = args.require_str("query")?;
        if self.write_guard.is_match(query) {
            return Err(ToolError::InvalidArguments(vec![
                "query must be read-only; mutating clauses are not allowed".to_string(),
            ]));
        }
        let parameters = args
            .get_object("parameters")
            .map(|map| Value::Object(map.clone()))
            .unwrap_or_else(|| json!({}));

        let records = self.gateway.execute(query, parameters).await?;

        let payload = json!({
            "row_count": records.len(),
            "rows": records,
        });
        let renderable = Renderable::table("Query results", &records);

        Ok(ToolOutput::new(payload).with_renderable(renderable))
    }
}

/// Report the store's structural summary: node labels, relationship types,
/// and property names.
pub struct GraphSchemaTool {
    gateway: Arc<dyn GraphGateway>,
}

impl GraphSchemaTool {
    pub fn new(gateway: Arc<dyn GraphGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for GraphSchemaTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "get_graph_schema",
            "Return the graph schema: node labels, relationship types, and property names",
        )
        .with_param(ParamSpec::optional(
            "refresh",
            ParamType::Boolean,
            "Bypass the session cache and refetch the schema",
        ))
    }

    async fn execute(&self, args: &BoundArgs) -> Result<ToolOutput, ToolError> {
        let schema = if args.get_bool("refresh").unwrap_or(false) {
            self.gateway.refresh_schema().await?
        } else {
            self.gateway.schema().await?
        };

        let payload = json!({
            "node_labels": schema.node_labels,
            "relationship_types": schema.relationship_types,
            "property_names": schema.property_names,
            "summary": schema.summary(),
        });

        Ok(ToolOutput::new(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_guard_catches_mutating_clauses() {
        let pattern = RegexBuilder::new(WRITE_CLAUSES)
            .case_insensitive(true)
            .build()
            .unwrap();
        assert!(pattern.is_match("CREATE (n:Product) RETURN n"));
        assert!(pattern.is_match("match (n) detach delete n"));
        assert!(pattern.is_match("LOAD CSV FROM 'file:///x' AS row RETURN row"));
        assert!(!pattern.is_match("MATCH (n:Product) RETURN n.name"));
    }
}
