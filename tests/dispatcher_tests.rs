use serde_json::json;
use std::sync::Arc;

use chaintrace::config::GatewaySettings;
use chaintrace::error::FailureKind;
use chaintrace::test_utils::{sample_supply_chain, MemoryGateway};
use chaintrace::tools::builtin::{ConcentrationRiskTool, TraceSupplyPathsTool};
use chaintrace::tools::{Dispatcher, ToolRegistry};
use chaintrace::types::{ToolCall, ToolOutcome};

fn dispatcher_over(gateway: Arc<MemoryGateway>) -> Dispatcher {
    let mut registry = ToolRegistry::new();
    registry
        .register(Arc::new(TraceSupplyPathsTool::new(gateway.clone())))
        .unwrap();
    registry
        .register(Arc::new(ConcentrationRiskTool::new(gateway)))
        .unwrap();
    let settings = GatewaySettings {
        retry_base_delay_ms: 1,
        ..GatewaySettings::default()
    };
    Dispatcher::new(Arc::new(registry), &settings)
}

#[tokio::test]
async fn malformed_arguments_fail_before_any_graph_io() {
    let gateway = Arc::new(sample_supply_chain());
    let dispatcher = dispatcher_over(gateway.clone());

    let result = dispatcher
        .dispatch(ToolCall::new(
            "trace_supply_paths",
            json!({ "product": 42, "verbosity": "high" }),
        ))
        .await;

    match &result.outcome {
        ToolOutcome::Failure { kind, message } => {
            assert_eq!(*kind, FailureKind::InvalidArguments);
            assert!(message.contains("product"));
            assert!(message.contains("unknown argument 'verbosity'"));
        }
        other => panic!("expected a validation failure, got {other:?}"),
    }
    assert_eq!(gateway.call_count(), 0);
}

#[tokio::test]
async fn citations_point_only_at_data_the_store_returned() {
    let gateway = Arc::new(sample_supply_chain());
    let dispatcher = dispatcher_over(gateway.clone());

    let result = dispatcher
        .dispatch(ToolCall::new(
            "trace_supply_paths",
            json!({ "product": "Coldarex", "direction": "upstream" }),
        ))
        .await;

    assert!(result.is_success());
    let citations = result.citations();
    assert!(!citations.is_empty());

    let returned = gateway.returned_ids();
    for citation in citations {
        assert!(
            returned.contains(&citation.element_id),
            "citation {} was never served by the store",
            citation.element_id
        );
    }
}

#[tokio::test]
async fn unknown_tool_name_is_reported_not_crashed() {
    let dispatcher = dispatcher_over(Arc::new(sample_supply_chain()));
    let result = dispatcher
        .dispatch(ToolCall::new("summon_forklift", json!({})))
        .await;

    assert!(matches!(
        result.outcome,
        ToolOutcome::Failure {
            kind: FailureKind::ToolNotFound,
            ..
        }
    ));
}

#[tokio::test]
async fn transient_connection_faults_are_retried() {
    let gateway = Arc::new(sample_supply_chain());
    let dispatcher = dispatcher_over(gateway.clone());

    gateway.fail_next_with_connection(1);
    let result = dispatcher
        .dispatch(ToolCall::new("supplier_concentration", json!({})))
        .await;

    assert!(result.is_success());
    // The failed attempt, then both statements of the successful retry.
    assert_eq!(gateway.call_count(), 3);
}

#[tokio::test]
async fn retry_budget_is_bounded() {
    let gateway = Arc::new(sample_supply_chain());
    let dispatcher = dispatcher_over(gateway.clone());

    // Three injected faults exceed the two-attempt retry budget.
    gateway.fail_next_with_connection(3);
    let result = dispatcher
        .dispatch(ToolCall::new("supplier_concentration", json!({})))
        .await;

    assert!(matches!(
        result.outcome,
        ToolOutcome::Failure {
            kind: FailureKind::Connection,
            ..
        }
    ));
    assert_eq!(gateway.call_count(), 3);
}
