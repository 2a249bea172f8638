//! Runtime wiring: gateway + index + tool catalogue + reasoning provider.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::{ReasoningLoop, ReasoningProvider};
use crate::assembler::{assemble, AgentAnswer};
use crate::config::Settings;
use crate::gateway::GraphGateway;
use crate::index::IndexManager;
use crate::tools::builtin::{
    ConcentrationRiskTool, DetectDistributionLoopsTool, GraphSchemaTool, NameSearchTool,
    ReadGraphQueryTool, SharedDependencyTool, TraceSupplyPathsTool,
};
use crate::tools::{Dispatcher, ToolRegistry};

const SYSTEM_PROMPT: &str = "\
You are a supply-chain graph expert answering questions about products, \
raw materials, APIs, suppliers, and distributors. Trace the graph to find \
the relevant evidence for each question.

Prefer the specialized analytical tools where they fit; fall back to \
read_graph_query for anything else. When writing queries:
* Make sure you know the data model schema first (get_graph_schema).
* If the store reports an error, refactor the query and try again.
* If a result is empty, judge whether the query was actually correct.

Always answer with citations to the underlying graph data, in markdown.";

/// Readiness of the pre-warmed shared resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readiness {
    pub schema_warm: bool,
    pub index_ready: bool,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        self.schema_warm && self.index_ready
    }
}

/// Long-lived agent service: one instance serves many sessions. The
/// gateway and the full-text index are the only cross-session shared state.
pub struct AgentRuntime {
    gateway: Arc<dyn GraphGateway>,
    index: Arc<IndexManager>,
    dispatcher: Arc<Dispatcher>,
    provider: Arc<dyn ReasoningProvider>,
    settings: Settings,
    schema_summary: RwLock<Option<String>>,
}

impl AgentRuntime {
    /// Wire up the full tool catalogue. The registry is append-only after
    /// this point.
    pub fn new(
        gateway: Arc<dyn GraphGateway>,
        provider: Arc<dyn ReasoningProvider>,
        settings: Settings,
    ) -> Result<Self> {
        let index = Arc::new(IndexManager::new());

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(ReadGraphQueryTool::new(gateway.clone())))?;
        registry.register(Arc::new(GraphSchemaTool::new(gateway.clone())))?;
        registry.register(Arc::new(NameSearchTool::new(
            gateway.clone(),
            index.clone(),
            settings.index.name.clone(),
            settings.index.default_top_k,
        )))?;
        registry.register(Arc::new(TraceSupplyPathsTool::new(gateway.clone())))?;
        registry.register(Arc::new(DetectDistributionLoopsTool::new(gateway.clone())))?;
        registry.register(Arc::new(ConcentrationRiskTool::new(gateway.clone())))?;
        registry.register(Arc::new(SharedDependencyTool::new(gateway.clone())))?;
        info!(tools = registry.len(), "tool catalogue registered");

        let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry), &settings.gateway));

        Ok(Self {
            gateway,
            index,
            dispatcher,
            provider,
            settings,
            schema_summary: RwLock::new(None),
        })
    }

    pub fn index(&self) -> &Arc<IndexManager> {
        &self.index
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Pre-warm the schema cache and build the configured full-text index.
    /// Neither failure is fatal: the agent can fetch the schema through a
    /// tool mid-conversation, and index queries fail typed until built.
    pub async fn warm(&self) -> Readiness {
        match self.gateway.schema().await {
            Ok(schema) => {
                *self.schema_summary.write().await = Some(schema.summary());
                info!("graph schema pre-warmed");
            }
            Err(error) => {
                warn!(%error, "could not pre-warm the graph schema");
            }
        }

        match self
            .index
            .build(
                self.gateway.as_ref(),
                &self.settings.index.name,
                &self.settings.index.label,
                &self.settings.index.fields,
            )
            .await
        {
            Ok(documents) => info!(documents, "full-text index pre-warmed"),
            Err(error) => warn!(%error, "could not build the full-text index"),
        }

        self.readiness().await
    }

    pub async fn readiness(&self) -> Readiness {
        Readiness {
            schema_warm: self.schema_summary.read().await.is_some(),
            index_ready: self.index.is_ready(&self.settings.index.name),
        }
    }

    /// Run one question through a fresh session.
    pub async fn ask(&self, question: &str) -> AgentAnswer {
        self.ask_with_cancellation(question, CancellationToken::new())
            .await
    }

    /// Like `ask`, but abortable through an external cancellation signal.
    pub async fn ask_with_cancellation(
        &self,
        question: &str,
        cancel: CancellationToken,
    ) -> AgentAnswer {
        let system_prompt = match self.schema_summary.read().await.as_deref() {
            Some(summary) => format!("{SYSTEM_PROMPT}\n\nDatabase schema:\n{summary}"),
            None => SYSTEM_PROMPT.to_string(),
        };

        let reasoning_loop = ReasoningLoop::new(
            self.provider.clone(),
            self.dispatcher.clone(),
            self.settings.agent.clone(),
            system_prompt,
        )
        .with_cancellation(cancel);

        let outcome = reasoning_loop.run(question).await;
        assemble(&outcome)
    }
}
