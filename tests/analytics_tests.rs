use serde_json::{json, Value};
use std::sync::Arc;

use chaintrace::config::GatewaySettings;
use chaintrace::test_utils::{sample_supply_chain, MemoryGateway};
use chaintrace::tools::builtin::{
    ConcentrationRiskTool, DetectDistributionLoopsTool, SharedDependencyTool, TraceSupplyPathsTool,
};
use chaintrace::tools::{Dispatcher, ToolRegistry};
use chaintrace::types::{ToolCall, ToolOutcome};

fn dispatcher() -> Dispatcher {
    dispatcher_over(Arc::new(sample_supply_chain()))
}

fn dispatcher_over(gateway: Arc<MemoryGateway>) -> Dispatcher {
    let mut registry = ToolRegistry::new();
    registry
        .register(Arc::new(TraceSupplyPathsTool::new(gateway.clone())))
        .unwrap();
    registry
        .register(Arc::new(DetectDistributionLoopsTool::new(gateway.clone())))
        .unwrap();
    registry
        .register(Arc::new(ConcentrationRiskTool::new(gateway.clone())))
        .unwrap();
    registry
        .register(Arc::new(SharedDependencyTool::new(gateway)))
        .unwrap();
    Dispatcher::new(Arc::new(registry), &GatewaySettings::default())
}

fn success_payload(outcome: &ToolOutcome) -> &Value {
    match outcome {
        ToolOutcome::Success { payload, .. } => payload,
        other => panic!("expected success, got {other:?}"),
    }
}

fn node_names(path: &Value) -> Vec<&str> {
    path["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["name"].as_str().unwrap())
        .collect()
}

#[tokio::test]
async fn upstream_trace_enumerates_every_distinct_chain_in_order() {
    let result = dispatcher()
        .dispatch(ToolCall::new(
            "trace_supply_paths",
            json!({ "product": "Coldarex", "direction": "upstream" }),
        ))
        .await;

    let payload = success_payload(&result.outcome);
    let paths = payload["paths"].as_array().unwrap();
    assert_eq!(paths.len(), 3);

    assert_eq!(
        node_names(&paths[0]),
        vec!["Coldarex", "Paracetamol API", "Acetic Anhydride", "Dilip Chemicals Pvt Ltd"]
    );
    assert_eq!(
        node_names(&paths[1]),
        vec!["Coldarex", "Paracetamol API", "PNCB", "Dilip Chemicals Pvt Ltd"]
    );
    assert_eq!(
        node_names(&paths[2]),
        vec!["Coldarex", "Paracetamol API", "PNCB", "Sunrise Pharma"]
    );
    for path in paths {
        assert_eq!(path["length"], 3);
    }
}

#[tokio::test]
async fn product_name_resolution_ignores_case() {
    let result = dispatcher()
        .dispatch(ToolCall::new(
            "trace_supply_paths",
            json!({ "product": "coldarex", "direction": "downstream" }),
        ))
        .await;

    let payload = success_payload(&result.outcome);
    let paths = payload["paths"].as_array().unwrap();
    assert_eq!(paths.len(), 1);
    assert_eq!(
        node_names(&paths[0]),
        vec!["Coldarex", "Dilip Distribution GmbH", "Warsaw Depot", "Vienna Depot", "Zagreb Depot"]
    );
}

#[tokio::test]
async fn hop_budget_caps_chain_length() {
    let result = dispatcher()
        .dispatch(ToolCall::new(
            "trace_supply_paths",
            json!({ "product": "Coldarex", "direction": "downstream", "max_hops": 2 }),
        ))
        .await;

    let payload = success_payload(&result.outcome);
    for path in payload["paths"].as_array().unwrap() {
        assert!(path["length"].as_i64().unwrap() <= 2);
    }
}

#[tokio::test]
async fn the_depot_loop_is_reported_once_with_its_full_ordering() {
    let result = dispatcher()
        .dispatch(ToolCall::new(
            "detect_distribution_loops",
            json!({ "product": "Coldarex" }),
        ))
        .await;

    let payload = success_payload(&result.outcome);
    let loops = payload["loops"].as_array().unwrap();
    assert_eq!(loops.len(), 1);
    assert_eq!(loops[0]["length"], 3);
    assert_eq!(
        node_names(&loops[0]),
        vec!["Warsaw Depot", "Vienna Depot", "Zagreb Depot"]
    );
}

#[tokio::test]
async fn a_loop_at_the_end_of_a_very_long_chain_is_still_found() {
    const CHAIN: usize = 30_000;

    let mut gateway = MemoryGateway::new();
    gateway.add_node("p0", "Chainarex", &["Product", "Entity"]);
    for i in 0..CHAIN {
        gateway.add_node(
            &format!("c{i:05}"),
            &format!("Depot {i:05}"),
            &["Distributor", "Entity"],
        );
    }
    gateway.add_relationship("t0", "DISTRIBUTES", "p0", "c00000");
    for i in 0..CHAIN - 1 {
        gateway.add_relationship(
            &format!("t{}", i + 1),
            "DELIVERS_TO",
            &format!("c{i:05}"),
            &format!("c{:05}", i + 1),
        );
    }
    gateway.add_relationship(
        "tback",
        "DELIVERS_TO",
        &format!("c{:05}", CHAIN - 1),
        "c00000",
    );

    let result = dispatcher_over(Arc::new(gateway))
        .dispatch(ToolCall::new(
            "detect_distribution_loops",
            json!({ "product": "Chainarex", "max_depth": CHAIN + 5 }),
        ))
        .await;

    let payload = success_payload(&result.outcome);
    let loops = payload["loops"].as_array().unwrap();
    assert_eq!(loops.len(), 1);
    assert_eq!(loops[0]["length"], CHAIN);
}

#[tokio::test]
async fn loop_search_terminates_under_a_tight_depth_bound() {
    let result = dispatcher()
        .dispatch(ToolCall::new(
            "detect_distribution_loops",
            json!({ "product": "Coldarex", "max_depth": 3 }),
        ))
        .await;

    // The loop sits four hops out, so a depth of three finds nothing but
    // still returns cleanly.
    let payload = success_payload(&result.outcome);
    assert!(payload["loops"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn single_approved_supplier_materials_are_flagged() {
    let result = dispatcher()
        .dispatch(ToolCall::new("supplier_concentration", json!({})))
        .await;

    let ToolOutcome::Success {
        payload, citations, ..
    } = &result.outcome
    else {
        panic!("expected success, got {:?}", result.outcome);
    };

    // Both APIs lack an approved supplier edge, so they join Acetic
    // Anhydride (one approved supplier) under the default threshold.
    let flagged = payload["flagged"].as_array().unwrap();
    let counts: Vec<(&str, i64)> = flagged
        .iter()
        .map(|f| {
            (
                f["material"]["name"].as_str().unwrap(),
                f["approved_supplier_count"].as_i64().unwrap(),
            )
        })
        .collect();
    assert_eq!(counts.len(), 3);
    assert!(counts.contains(&("Acetic Anhydride", 1)));
    assert!(counts.contains(&("Paracetamol API", 0)));
    assert!(counts.contains(&("Ibuprofen API", 0)));

    let acetic = flagged
        .iter()
        .find(|f| f["material"]["name"] == "Acetic Anhydride")
        .unwrap();
    assert_eq!(acetic["suppliers"][0]["name"], "Dilip Chemicals Pvt Ltd");

    let cited: Vec<&str> = citations.iter().map(|c| c.element_id.as_str()).collect();
    assert!(cited.contains(&"r1"));
    assert!(cited.contains(&"s1"));
    assert!(cited.contains(&"e1"));
}

#[tokio::test]
async fn materials_with_no_approved_supplier_are_flagged_at_count_zero() {
    let mut gateway = sample_supply_chain();
    gateway.add_node("r3", "Orphanol", &["RawMaterial", "Entity"]);

    let result = dispatcher_over(Arc::new(gateway))
        .dispatch(ToolCall::new("supplier_concentration", json!({})))
        .await;

    let ToolOutcome::Success {
        payload, citations, ..
    } = &result.outcome
    else {
        panic!("expected success, got {:?}", result.outcome);
    };

    let orphan = payload["flagged"]
        .as_array()
        .unwrap()
        .iter()
        .find(|f| f["material"]["name"] == "Orphanol")
        .expect("a material with zero approved suppliers must be flagged");
    assert_eq!(orphan["approved_supplier_count"], 0);
    assert!(orphan["suppliers"].as_array().unwrap().is_empty());

    assert!(citations.iter().any(|c| c.element_id == "r3"));
}

#[tokio::test]
async fn raising_the_threshold_flags_more_materials() {
    let result = dispatcher()
        .dispatch(ToolCall::new(
            "supplier_concentration",
            json!({ "threshold": 2 }),
        ))
        .await;

    let payload = success_payload(&result.outcome);
    let names: Vec<&str> = payload["flagged"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["material"]["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"Acetic Anhydride"));
    assert!(names.contains(&"PNCB"));
}

#[tokio::test]
async fn shared_dependencies_are_ranked_by_product_fan_out() {
    let result = dispatcher()
        .dispatch(ToolCall::new(
            "shared_dependency_search",
            json!({ "min_products": 2 }),
        ))
        .await;

    let payload = success_payload(&result.outcome);
    let dependencies = payload["dependencies"].as_array().unwrap();
    let names: Vec<&str> = dependencies
        .iter()
        .map(|d| d["dependency"]["name"].as_str().unwrap())
        .collect();
    // Equal counts fall back to name order.
    assert_eq!(names, vec!["Dilip Chemicals Pvt Ltd", "PNCB", "Sunrise Pharma"]);
    for dependency in dependencies {
        assert_eq!(dependency["product_count"], 2);
    }
}

#[tokio::test]
async fn dependencies_below_the_minimum_are_omitted() {
    let result = dispatcher()
        .dispatch(ToolCall::new(
            "shared_dependency_search",
            json!({ "min_products": 3 }),
        ))
        .await;

    let payload = success_payload(&result.outcome);
    assert!(payload["dependencies"].as_array().unwrap().is_empty());
}
