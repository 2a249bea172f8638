//! Single-point-of-risk scoring for raw materials and APIs.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ToolError;
use crate::gateway::GraphGateway;
use crate::tools::{BoundArgs, ParamSpec, ParamType, Tool, ToolOutput, ToolSpec};
use crate::types::{Citation, GraphRecord, Renderable};

const DEFAULT_THRESHOLD: i64 = 1;

/// Every raw-material and API node, supplied or not. Fetched separately so
/// a material with no approved supplier still forms a count-zero group.
pub const MATERIAL_NODES_QUERY: &str = "MATCH (m) WHERE m:RawMaterial OR m:API \
     RETURN elementId(m) AS material_id, m.name AS material_name, labels(m) AS material_labels";

/// Approved supply relationships into raw-material and API nodes.
pub const APPROVED_SUPPLY_QUERY: &str = "MATCH (s:Supplier)-[r:SUPPLIES]->(m) \
     WHERE (m:RawMaterial OR m:API) AND coalesce(r.approved, false) \
     RETURN elementId(m) AS material_id, m.name AS material_name, labels(m) AS material_labels, \
     elementId(s) AS supplier_id, s.name AS supplier_name, elementId(r) AS relationship_id";

#[derive(Debug, Default)]
struct MaterialGroup {
    name: String,
    labels: Vec<String>,
    /// supplier id -> (name, relationship id)
    suppliers: BTreeMap<String, (String, String)>,
}

/// Groups materials by their count of distinct approved suppliers and flags
/// every group at or below the threshold (default 1, a single point of
/// failure). A material with no approved supplier at all counts as zero.
pub struct ConcentrationRiskTool {
    gateway: Arc<dyn GraphGateway>,
}

impl ConcentrationRiskTool {
    pub fn new(gateway: Arc<dyn GraphGateway>) -> Self {
        Self { gateway }
    }

    fn group(
        materials: &[GraphRecord],
        supplies: &[GraphRecord],
    ) -> BTreeMap<String, MaterialGroup> {
        let mut groups: BTreeMap<String, MaterialGroup> = BTreeMap::new();

        for record in materials {
            let Some(material_id) = record.get_str("material_id") else {
                continue;
            };
            let group = groups.entry(material_id.to_string()).or_default();
            group.name = record.get_str("material_name").unwrap_or_default().to_string();
            group.labels = super::flows::string_list(record.get("material_labels"));
        }

        for record in supplies {
            let (Some(material_id), Some(supplier_id)) =
                (record.get_str("material_id"), record.get_str("supplier_id"))
            else {
                continue;
            };
            let group = groups.entry(material_id.to_string()).or_default();
            group.name = record.get_str("material_name").unwrap_or_default().to_string();
            group.labels = super::flows::string_list(record.get("material_labels"));
            group.suppliers.insert(
                supplier_id.to_string(),
                (
                    record.get_str("supplier_name").unwrap_or_default().to_string(),
                    record
                        .get_str("relationship_id")
                        .unwrap_or_default()
                        .to_string(),
                ),
            );
        }
        groups
    }
}

#[async_trait]
impl Tool for ConcentrationRiskTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "supplier_concentration",
            "Score concentration risk: find raw materials and APIs whose count of \
             distinct approved suppliers is at or below a threshold. Materials \
             with no approved supplier count as zero",
        )
        .with_param(ParamSpec::optional(
            "threshold",
            ParamType::Integer,
            "Flag materials with this many approved suppliers or fewer (default 1)",
        ))
    }

    async fn execute(&self, args: &BoundArgs) -> Result<ToolOutput, ToolError> {
        let threshold = args.get_i64("threshold").unwrap_or(DEFAULT_THRESHOLD);
        if threshold < 1 {
            return Err(ToolError::InvalidArguments(vec![
                "threshold must be at least 1".to_string(),
            ]));
        }

        let materials = self
            .gateway
            .execute(MATERIAL_NODES_QUERY, json!({}))
            .await?;
        let supplies = self
            .gateway
            .execute(APPROVED_SUPPLY_QUERY, json!({}))
            .await?;
        let groups = Self::group(&materials, &supplies);

        let mut citations: Vec<Citation> = Vec::new();
        let mut flagged: Vec<Value> = Vec::new();
        let mut rows = Vec::new();

        for (material_id, group) in &groups {
            let count = group.suppliers.len() as i64;
            if count > threshold {
                continue;
            }

            let suppliers: Vec<Value> = group
                .suppliers
                .iter()
                .map(|(id, (name, _))| json!({ "id": id, "name": name }))
                .collect();
            flagged.push(json!({
                "material": { "id": material_id, "name": group.name, "labels": group.labels },
                "approved_supplier_count": count,
                "suppliers": suppliers,
            }));
            rows.push(GraphRecord::from_pairs(vec![
                ("material".to_string(), json!(group.name)),
                ("approved_suppliers".to_string(), json!(count)),
                (
                    "suppliers".to_string(),
                    json!(group
                        .suppliers
                        .values()
                        .map(|(name, _)| name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")),
                ),
            ]));

            citations.push(
                Citation::node(material_id)
                    .with_property("name", group.name.clone())
                    .with_property("approved_supplier_count", count),
            );
            for (supplier_id, (name, relationship_id)) in &group.suppliers {
                citations.push(Citation::node(supplier_id).with_property("name", name.clone()));
                citations.push(
                    Citation::relationship(relationship_id).with_property("approved", true),
                );
            }
        }

        let payload = json!({
            "threshold": threshold,
            "flagged": flagged,
        });
        let renderable =
            Renderable::table("Materials at concentration risk", &rows).with_context(
                "threshold",
                threshold,
            );

        Ok(ToolOutput::new(payload)
            .with_citations(citations)
            .with_renderable(renderable))
    }
}
