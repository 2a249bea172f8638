//! Response Assembler
//!
//! Pure transformation of a terminal session into the structured response
//! surface: answer text, ordered reasoning/tool trace, and the renderable
//! artifacts referenced by successful tool results. Never re-executes tools.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::agent::{LoopOutcome, SessionOutcome};
use crate::types::{Renderable, ToolOutcome, TraceEvent};

const OUTCOME_PREVIEW_CHARS: usize = 200;

/// One row of the user-visible tool trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub tool: String,
    pub arguments: Value,
    pub success: bool,
    pub summary: String,
    pub elapsed: Duration,
}

/// Final structured response for the front end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAnswer {
    pub answer: String,
    /// False when the session aborted and the answer is best-effort.
    pub complete: bool,
    pub session_id: String,
    pub trace: Vec<TraceStep>,
    pub renderables: Vec<Renderable>,
}

/// Map a terminal session into the response surface.
pub fn assemble(outcome: &SessionOutcome) -> AgentAnswer {
    let mut trace = Vec::new();
    let mut renderables = Vec::new();
    let mut last_reasoning: Option<&str> = None;

    for event in outcome.state.events() {
        match event {
            TraceEvent::UserTurn { .. } => {}
            TraceEvent::Reasoning { text } => last_reasoning = Some(text),
            TraceEvent::Tool { result } => {
                let (success, summary) = match &result.outcome {
                    ToolOutcome::Success {
                        payload,
                        citations,
                        renderable,
                    } => {
                        if let Some(renderable) = renderable {
                            renderables.push(renderable.clone());
                        }
                        let preview = preview(&payload.to_string());
                        (
                            true,
                            format!("{preview} ({} citations)", citations.len()),
                        )
                    }
                    ToolOutcome::Failure { kind, message } => {
                        (false, format!("{kind:?}: {}", preview(message)))
                    }
                };
                trace.push(TraceStep {
                    tool: result.call.name.clone(),
                    arguments: result.call.arguments.clone(),
                    success,
                    summary,
                    elapsed: result.elapsed,
                });
            }
        }
    }

    let (answer, complete) = match &outcome.outcome {
        LoopOutcome::Answered { answer } => (answer.clone(), true),
        LoopOutcome::Aborted { reason } => {
            let gathered = trace.iter().filter(|step| step.success).count();
            let partial = match last_reasoning {
                Some(text) => format!("Partial findings so far: {text}"),
                None if gathered > 0 => format!(
                    "{gathered} tool result(s) were gathered before the session ended; \
                     see the trace below."
                ),
                None => "No findings were gathered before the session ended.".to_string(),
            };
            (
                format!("[incomplete: {reason}] {partial}"),
                false,
            )
        }
    };

    AgentAnswer {
        answer,
        complete,
        session_id: outcome.state.session_id.clone(),
        trace,
        renderables,
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() <= OUTCOME_PREVIEW_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(OUTCOME_PREVIEW_CHARS - 3).collect();
    format!("{cut}...")
}
