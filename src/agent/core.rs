//! Reasoning loop
//!
//! Drives think -> act -> observe cycles: presents the session trace and the
//! tool catalogue to the reasoning service, executes requested tool calls
//! through the dispatcher, appends observations, and repeats until a final
//! answer arrives or a budget runs out. The loop itself never terminates on
//! an unhandled fault; every failure becomes a typed result or an abort
//! marker.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::model::{render_transcript, ReasoningProvider, ReasoningReply, ReasoningRequest};
use crate::config::LoopSettings;
use crate::error::{AbortReason, FailureKind};
use crate::tools::Dispatcher;
use crate::types::{SessionState, ToolCall, ToolResult};

/// States of the loop's state machine. `Aborted` is reachable from any
/// state on budget exhaustion or cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    AwaitingInput,
    Reasoning,
    Acting,
    Observing,
    Answered,
    Aborted,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum LoopOutcome {
    Answered { answer: String },
    Aborted { reason: AbortReason },
}

/// Terminal session trace plus its verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub run_id: String,
    pub state: SessionState,
    pub outcome: LoopOutcome,
}

impl SessionOutcome {
    pub fn terminal_state(&self) -> LoopState {
        match self.outcome {
            LoopOutcome::Answered { .. } => LoopState::Answered,
            LoopOutcome::Aborted { .. } => LoopState::Aborted,
        }
    }

    pub fn is_answered(&self) -> bool {
        matches!(self.outcome, LoopOutcome::Answered { .. })
    }
}

/// One reasoning loop; owns its SessionState exclusively for the duration
/// of a run.
pub struct ReasoningLoop {
    provider: Arc<dyn ReasoningProvider>,
    dispatcher: Arc<Dispatcher>,
    settings: LoopSettings,
    system_prompt: String,
    cancel: CancellationToken,
}

impl ReasoningLoop {
    pub fn new(
        provider: Arc<dyn ReasoningProvider>,
        dispatcher: Arc<Dispatcher>,
        settings: LoopSettings,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            dispatcher,
            settings,
            system_prompt: system_prompt.into(),
            cancel: CancellationToken::new(),
        }
    }

    /// Attach an external cancellation signal.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run one session to completion or abort.
    pub async fn run(&self, question: &str) -> SessionOutcome {
        let run_id = format!("run-{}", Uuid::new_v4());
        let deadline = Instant::now() + self.settings.hard_timeout();

        let mut state = SessionState::new();
        debug!(%run_id, state = ?LoopState::AwaitingInput, "session started");
        state.push_user(question);

        let specs = self.dispatcher.registry().specs();

        for iteration in 1..=self.settings.max_iterations {
            if self.cancel.is_cancelled() {
                return self.abort(run_id, state, AbortReason::Cancelled);
            }

            debug!(%run_id, iteration, state = ?LoopState::Reasoning, "presenting trace to reasoning service");
            let request = ReasoningRequest {
                system_prompt: self.system_prompt.clone(),
                transcript: render_transcript(&state, self.settings.max_transcript_chars),
                tools: specs.clone(),
            };

            let reply = tokio::select! {
                _ = self.cancel.cancelled() => {
                    return self.abort(run_id, state, AbortReason::Cancelled);
                }
                outcome = tokio::time::timeout_at(deadline, self.provider.reason(&request)) => {
                    match outcome {
                        Err(_) => return self.abort(run_id, state, AbortReason::Timeout),
                        Ok(Err(error)) => {
                            // Provider hiccups consume budget but never crash
                            // the loop.
                            warn!(%run_id, iteration, %error, "reasoning service call failed");
                            state.push_reasoning(format!("Reasoning service error: {error}"));
                            continue;
                        }
                        Ok(Ok(reply)) => reply,
                    }
                }
            };

            match reply {
                ReasoningReply::FinalAnswer(answer) => {
                    info!(%run_id, iteration, state = ?LoopState::Answered, "final answer produced");
                    state.push_reasoning(answer.clone());
                    return SessionOutcome {
                        run_id,
                        state,
                        outcome: LoopOutcome::Answered { answer },
                    };
                }
                ReasoningReply::ToolRequests(calls) if calls.is_empty() => continue,
                ReasoningReply::ToolRequests(calls) => {
                    debug!(%run_id, iteration, state = ?LoopState::Acting, requested = calls.len(), "executing tool calls");
                    let (results, interrupted) = self.execute_batch(calls, deadline).await;

                    debug!(%run_id, iteration, state = ?LoopState::Observing, "merging tool results in request order");
                    for result in results {
                        state.push_tool(result);
                    }
                    if let Some(reason) = interrupted {
                        return self.abort(run_id, state, reason);
                    }
                }
            }
        }

        self.abort(run_id, state, AbortReason::IterationBudget)
    }

    /// Fan tool calls out under the worker-pool bound. Results come back in
    /// request order regardless of completion order; a cancelled or timed
    /// out batch still yields one result per requested call, so the trace
    /// never shows a dangling ToolCall.
    async fn execute_batch(
        &self,
        calls: Vec<ToolCall>,
        deadline: Instant,
    ) -> (Vec<ToolResult>, Option<AbortReason>) {
        let semaphore = Arc::new(Semaphore::new(self.settings.tool_concurrency.max(1)));

        let tasks = calls.into_iter().map(|call| {
            let semaphore = Arc::clone(&semaphore);
            let dispatcher = Arc::clone(&self.dispatcher);
            let cancel = self.cancel.clone();
            async move {
                let permit = semaphore.acquire_owned().await;
                if permit.is_err() {
                    return ToolResult::failure(
                        call,
                        FailureKind::Cancelled,
                        "session cancelled before the tool started",
                        Duration::ZERO,
                    );
                }
                tokio::select! {
                    _ = cancel.cancelled() => ToolResult::failure(
                        call,
                        FailureKind::Cancelled,
                        "session cancelled before the tool completed",
                        Duration::ZERO,
                    ),
                    _ = tokio::time::sleep_until(deadline) => ToolResult::failure(
                        call,
                        FailureKind::Timeout,
                        "session deadline elapsed before the tool completed",
                        Duration::ZERO,
                    ),
                    result = dispatcher.dispatch(call.clone()) => result,
                }
            }
        });

        let results = join_all(tasks).await;

        let interrupted = if self.cancel.is_cancelled() {
            Some(AbortReason::Cancelled)
        } else if Instant::now() >= deadline {
            Some(AbortReason::Timeout)
        } else {
            None
        };
        (results, interrupted)
    }

    fn abort(&self, run_id: String, state: SessionState, reason: AbortReason) -> SessionOutcome {
        warn!(%run_id, state = ?LoopState::Aborted, %reason, "session aborted");
        SessionOutcome {
            run_id,
            state,
            outcome: LoopOutcome::Aborted { reason },
        }
    }
}
