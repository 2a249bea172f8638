use serde_json::json;
use std::sync::Arc;

use chaintrace::config::GatewaySettings;
use chaintrace::error::FailureKind;
use chaintrace::index::IndexManager;
use chaintrace::test_utils::{sample_supply_chain, MemoryGateway};
use chaintrace::tools::builtin::NameSearchTool;
use chaintrace::tools::{Dispatcher, ToolRegistry};
use chaintrace::types::{ToolCall, ToolOutcome};

const INDEX: &str = "supply_names";

async fn built_manager(gateway: &MemoryGateway) -> IndexManager {
    let manager = IndexManager::new();
    manager
        .build(gateway, INDEX, "Entity", &["name".to_string()])
        .await
        .unwrap();
    manager
}

#[tokio::test]
async fn queries_are_case_invariant_through_the_manager() {
    let gateway = sample_supply_chain();
    let manager = built_manager(&gateway).await;

    let lower = manager.query(INDEX, "dilip*", 10).unwrap();
    let upper = manager.query(INDEX, "DILIP*", 10).unwrap();
    assert_eq!(lower, upper);

    let ids: Vec<&str> = lower.iter().map(|h| h.node_id.as_str()).collect();
    assert!(ids.contains(&"s1"));
    assert!(ids.contains(&"d1"));
}

#[tokio::test]
async fn snapshots_survive_a_concurrent_rebuild() {
    let gateway = sample_supply_chain();
    let manager = built_manager(&gateway).await;

    // A reader holding this snapshot must keep seeing the old generation.
    let before = manager.snapshot(INDEX).unwrap();
    assert!(!before.contains("x1"));

    let mut changed = sample_supply_chain();
    changed.add_node("x1", "Dilipol Extra", &["Entity"]);
    manager
        .build(&changed, INDEX, "Entity", &["name".to_string()])
        .await
        .unwrap();

    assert!(!before.contains("x1"));
    assert!(manager.snapshot(INDEX).unwrap().contains("x1"));
}

#[tokio::test]
async fn search_tool_fails_typed_before_the_first_build() {
    let gateway = Arc::new(sample_supply_chain());
    let manager = Arc::new(IndexManager::new());

    let mut registry = ToolRegistry::new();
    registry
        .register(Arc::new(NameSearchTool::new(
            gateway.clone(),
            manager,
            INDEX,
            10,
        )))
        .unwrap();
    let dispatcher = Dispatcher::new(Arc::new(registry), &GatewaySettings::default());

    let result = dispatcher
        .dispatch(ToolCall::new("search_on_name", json!({ "name": "dilip*" })))
        .await;

    assert!(matches!(
        result.outcome,
        ToolOutcome::Failure {
            kind: FailureKind::IndexNotFound,
            ..
        }
    ));
}

#[tokio::test]
async fn search_tool_returns_ranked_matches_with_citations() {
    let gateway = Arc::new(sample_supply_chain());
    let manager = Arc::new(IndexManager::new());
    manager
        .build(gateway.as_ref(), INDEX, "Entity", &["name".to_string()])
        .await
        .unwrap();

    let mut registry = ToolRegistry::new();
    registry
        .register(Arc::new(NameSearchTool::new(
            gateway.clone(),
            manager,
            INDEX,
            10,
        )))
        .unwrap();
    let dispatcher = Dispatcher::new(Arc::new(registry), &GatewaySettings::default());

    let result = dispatcher
        .dispatch(ToolCall::new("search_on_name", json!({ "name": "dilip*" })))
        .await;

    let ToolOutcome::Success {
        payload, citations, ..
    } = &result.outcome
    else {
        panic!("expected success, got {:?}", result.outcome);
    };

    let matches = payload["matches"].as_array().unwrap();
    assert_eq!(matches.len(), 2);
    // The shorter name scores higher under length normalization.
    assert_eq!(matches[0]["name"], "Dilip Distribution GmbH");
    assert_eq!(matches[1]["name"], "Dilip Chemicals Pvt Ltd");

    let returned = gateway.returned_ids();
    for citation in citations {
        assert!(returned.contains(&citation.element_id));
    }
}

#[tokio::test]
async fn fuzzy_and_phrase_expressions_reach_the_right_nodes() {
    let gateway = sample_supply_chain();
    let manager = built_manager(&gateway).await;

    let fuzzy = manager.query(INDEX, "dillip~", 10).unwrap();
    assert!(fuzzy.iter().any(|h| h.node_id == "s1"));
    assert!(!fuzzy.iter().any(|h| h.node_id == "s3"));

    let phrase = manager.query(INDEX, "\"paracetamol api\"", 10).unwrap();
    let ids: Vec<&str> = phrase.iter().map(|h| h.node_id.as_str()).collect();
    assert_eq!(ids, vec!["a1"]);
}
