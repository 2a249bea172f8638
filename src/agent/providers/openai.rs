//! OpenAI-compatible reasoning provider using native function calling.

use anyhow::{anyhow, Result};
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionTool, ChatCompletionToolType,
        CreateChatCompletionRequestArgs, FunctionObject,
    },
    Client,
};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::agent::model::{ReasoningProvider, ReasoningReply, ReasoningRequest};
use crate::tools::ToolSpec;
use crate::types::ToolCall;

/// Reasoning provider backed by an OpenAI-compatible chat-completions API.
#[derive(Debug, Clone)]
pub struct OpenAiReasoner {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiReasoner {
    /// Authenticates via the OPENAI_API_KEY environment variable.
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            model: "gpt-4.1-mini".to_string(),
        }
    }

    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            client: Client::with_config(config),
            model: "gpt-4.1-mini".to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn build_messages(
        &self,
        request: &ReasoningRequest,
    ) -> Result<Vec<ChatCompletionRequestMessage>> {
        let system = ChatCompletionRequestSystemMessageArgs::default()
            .content(request.system_prompt.clone())
            .build()
            .map_err(|e| anyhow!("failed to build system message: {e}"))?;
        let user = ChatCompletionRequestUserMessageArgs::default()
            .content(request.transcript.clone())
            .build()
            .map_err(|e| anyhow!("failed to build user message: {e}"))?;
        Ok(vec![
            ChatCompletionRequestMessage::System(system),
            ChatCompletionRequestMessage::User(user),
        ])
    }
}

impl Default for OpenAiReasoner {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert a tool spec into the provider's function-calling format.
pub fn spec_to_function(spec: &ToolSpec) -> ChatCompletionTool {
    ChatCompletionTool {
        r#type: ChatCompletionToolType::Function,
        function: FunctionObject {
            name: spec.name.clone(),
            description: Some(spec.description.clone()),
            parameters: Some(spec.schema_json()),
            strict: Some(false),
        },
    }
}

#[async_trait]
impl ReasoningProvider for OpenAiReasoner {
    fn name(&self) -> &str {
        "openai"
    }

    async fn reason(&self, request: &ReasoningRequest) -> Result<ReasoningReply> {
        let messages = self.build_messages(request)?;
        let tools: Vec<ChatCompletionTool> = request.tools.iter().map(spec_to_function).collect();

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .tools(tools)
            .build()
            .map_err(|e| anyhow!("failed to build chat request: {e}"))?;

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(|e| anyhow!("reasoning service error: {e}"))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("reasoning service returned no choices"))?;

        if let Some(tool_calls) = choice.message.tool_calls.filter(|calls| !calls.is_empty()) {
            let requests: Vec<ToolCall> = tool_calls
                .into_iter()
                .map(|call| {
                    let arguments: Value = serde_json::from_str(&call.function.arguments)
                        .unwrap_or(Value::Null);
                    ToolCall::new(call.function.name, arguments)
                })
                .collect();
            debug!(count = requests.len(), "reasoning service requested tools");
            return Ok(ReasoningReply::ToolRequests(requests));
        }

        let answer = choice
            .message
            .content
            .ok_or_else(|| anyhow!("reasoning service returned neither content nor tool calls"))?;
        Ok(ReasoningReply::FinalAnswer(answer))
    }
}
