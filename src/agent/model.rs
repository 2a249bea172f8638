//! Reasoning-service seam.
//!
//! The external language-reasoning service is a black box: it sees the
//! system instructions, the rendered session trace, and the tool catalogue,
//! and replies with exactly one of a final answer or an ordered list of
//! tool-invocation requests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::tools::ToolSpec;
use crate::types::{SessionState, ToolCall, ToolOutcome, TraceEvent};

const TOOL_PAYLOAD_PREVIEW_CHARS: usize = 2_000;

/// Everything the reasoning service is shown for one step.
#[derive(Debug, Clone)]
pub struct ReasoningRequest {
    pub system_prompt: String,
    pub transcript: String,
    pub tools: Vec<ToolSpec>,
}

/// The service's reply: a closed sum, no ad hoc type inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReasoningReply {
    FinalAnswer(String),
    ToolRequests(Vec<ToolCall>),
}

#[async_trait]
pub trait ReasoningProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn reason(&self, request: &ReasoningRequest) -> anyhow::Result<ReasoningReply>;
}

/// Render the session trace for the reasoning service, keeping the most
/// recent events within the character budget (older ones drop off the
/// front, the user's opening turn is kept).
pub fn render_transcript(state: &SessionState, max_chars: usize) -> String {
    let rendered: Vec<String> = state.events().iter().map(render_event).collect();

    let mut kept = std::collections::VecDeque::new();
    let mut used = 0usize;
    for (position, entry) in rendered.iter().enumerate().rev() {
        // Always keep the first user turn so the question survives trimming.
        let is_opening_turn = position == 0;
        if !is_opening_turn && used + entry.len() > max_chars {
            break;
        }
        used += entry.len();
        kept.push_front(entry.as_str());
    }
    if kept.is_empty() {
        if let Some(first) = rendered.first() {
            kept.push_front(first.as_str());
        }
    } else if !rendered.is_empty() && kept.front() != rendered.first().map(String::as_str).as_ref()
    {
        kept.push_front(rendered[0].as_str());
    }

    kept.into_iter().collect::<Vec<_>>().join("\n\n")
}

fn render_event(event: &TraceEvent) -> String {
    match event {
        TraceEvent::UserTurn { text } => format!("User: {text}"),
        TraceEvent::Reasoning { text } => format!("Assistant: {text}"),
        TraceEvent::Tool { result } => match &result.outcome {
            ToolOutcome::Success { payload, .. } => {
                let preview = truncate(&payload.to_string(), TOOL_PAYLOAD_PREVIEW_CHARS);
                format!("Tool {} succeeded: {preview}", result.call.name)
            }
            ToolOutcome::Failure { kind, message } => {
                format!("Tool {} failed ({kind:?}): {message}", result.call.name)
            }
        },
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{cut}...")
}
