use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use chaintrace::agent::providers::ScriptedReasoner;
use chaintrace::agent::{LoopOutcome, ReasoningLoop, ReasoningReply};
use chaintrace::assembler::assemble;
use chaintrace::config::{GatewaySettings, LoopSettings};
use chaintrace::error::{AbortReason, FailureKind, ToolError};
use chaintrace::test_utils::sample_supply_chain;
use chaintrace::tools::builtin::{ConcentrationRiskTool, TraceSupplyPathsTool};
use chaintrace::tools::{
    BoundArgs, Dispatcher, ParamSpec, ParamType, Tool, ToolOutput, ToolRegistry, ToolSpec,
};
use chaintrace::types::{ToolCall, ToolOutcome};

/// Tool that never finishes on its own; only budgets or cancellation stop it.
struct StallTool;

#[async_trait]
impl Tool for StallTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new("stall", "Wait forever").with_param(ParamSpec::optional(
            "label",
            ParamType::String,
            "Ignored",
        ))
    }

    async fn execute(&self, _args: &BoundArgs) -> Result<ToolOutput, ToolError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(ToolOutput::new(json!({})))
    }
}

fn dispatcher() -> Arc<Dispatcher> {
    let gateway = Arc::new(sample_supply_chain());
    let mut registry = ToolRegistry::new();
    registry
        .register(Arc::new(TraceSupplyPathsTool::new(gateway.clone())))
        .unwrap();
    registry
        .register(Arc::new(ConcentrationRiskTool::new(gateway)))
        .unwrap();
    registry.register(Arc::new(StallTool)).unwrap();
    Arc::new(Dispatcher::new(
        Arc::new(registry),
        &GatewaySettings::default(),
    ))
}

fn settings(max_iterations: usize, hard_timeout_secs: u64) -> LoopSettings {
    LoopSettings {
        max_iterations,
        hard_timeout_secs,
        tool_concurrency: 2,
        max_transcript_chars: 20_000,
    }
}

#[tokio::test]
async fn a_scripted_session_answers_with_an_ordered_trace() {
    let provider = Arc::new(ScriptedReasoner::new(vec![
        ReasoningReply::ToolRequests(vec![ToolCall::new(
            "supplier_concentration",
            json!({}),
        )]),
        ReasoningReply::ToolRequests(vec![
            ToolCall::new(
                "trace_supply_paths",
                json!({ "product": "Coldarex", "direction": "upstream" }),
            ),
            ToolCall::new("trace_supply_paths", json!({ "product": "nonexistent" })),
        ]),
        ReasoningReply::FinalAnswer(
            "Acetic Anhydride depends on a single approved supplier.".to_string(),
        ),
    ]));

    let reasoning_loop = ReasoningLoop::new(
        provider.clone(),
        dispatcher(),
        settings(10, 30),
        "You answer supply-chain questions.",
    );
    let outcome = reasoning_loop
        .run("Where is Coldarex exposed to a single supplier?")
        .await;

    assert!(outcome.is_answered());
    assert_eq!(provider.calls(), 3);

    // Results land in the trace in request order, failures included.
    let tools: Vec<&chaintrace::types::ToolResult> = outcome.state.tool_results().collect();
    assert_eq!(tools.len(), 3);
    assert_eq!(tools[0].call.name, "supplier_concentration");
    assert!(tools[0].is_success());
    assert!(tools[1].is_success());
    assert!(matches!(
        tools[2].outcome,
        ToolOutcome::Failure {
            kind: FailureKind::Execution,
            ..
        }
    ));

    let answer = assemble(&outcome);
    assert!(answer.complete);
    assert_eq!(answer.trace.len(), 3);
    assert!(answer.answer.contains("single approved supplier"));
}

#[tokio::test]
async fn the_iteration_budget_stops_a_looping_session() {
    let provider = Arc::new(ScriptedReasoner::new(vec![ReasoningReply::ToolRequests(
        vec![ToolCall::new("supplier_concentration", json!({}))],
    )]));

    let reasoning_loop = ReasoningLoop::new(
        provider.clone(),
        dispatcher(),
        settings(3, 30),
        "You answer supply-chain questions.",
    );
    let outcome = reasoning_loop.run("keep digging").await;

    assert!(matches!(
        outcome.outcome,
        LoopOutcome::Aborted {
            reason: AbortReason::IterationBudget
        }
    ));
    assert_eq!(provider.calls(), 3);

    let answer = assemble(&outcome);
    assert!(!answer.complete);
    assert!(answer.answer.starts_with("[incomplete:"));
    assert_eq!(answer.trace.len(), 3);
}

#[tokio::test]
async fn cancellation_aborts_without_dangling_tool_calls() {
    let provider = Arc::new(ScriptedReasoner::new(vec![ReasoningReply::ToolRequests(
        vec![
            ToolCall::new("stall", json!({})),
            ToolCall::new("supplier_concentration", json!({})),
        ],
    )]));

    let cancel = CancellationToken::new();
    let reasoning_loop = ReasoningLoop::new(
        provider,
        dispatcher(),
        settings(10, 3600),
        "You answer supply-chain questions.",
    )
    .with_cancellation(cancel.clone());

    let handle = tokio::spawn(async move { reasoning_loop.run("slow question").await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();
    let outcome = handle.await.unwrap();

    assert!(matches!(
        outcome.outcome,
        LoopOutcome::Aborted {
            reason: AbortReason::Cancelled
        }
    ));

    // Every requested call still has a result in the trace.
    let tools: Vec<&chaintrace::types::ToolResult> = outcome.state.tool_results().collect();
    assert_eq!(tools.len(), 2);
    assert_eq!(tools[0].call.name, "stall");
    assert!(matches!(
        tools[0].outcome,
        ToolOutcome::Failure {
            kind: FailureKind::Cancelled,
            ..
        }
    ));
}

#[tokio::test]
async fn the_hard_deadline_stops_a_stalled_tool() {
    let provider = Arc::new(ScriptedReasoner::new(vec![ReasoningReply::ToolRequests(
        vec![ToolCall::new("stall", json!({}))],
    )]));

    let reasoning_loop = ReasoningLoop::new(
        provider,
        dispatcher(),
        settings(10, 1),
        "You answer supply-chain questions.",
    );
    let outcome = reasoning_loop.run("slow question").await;

    assert!(matches!(
        outcome.outcome,
        LoopOutcome::Aborted {
            reason: AbortReason::Timeout
        }
    ));
    let tools: Vec<&chaintrace::types::ToolResult> = outcome.state.tool_results().collect();
    assert_eq!(tools.len(), 1);
    assert!(matches!(
        tools[0].outcome,
        ToolOutcome::Failure {
            kind: FailureKind::Timeout,
            ..
        }
    ));
}
