//! The completion engine: one model round trip, tools included.
//!
//! A [`CompletionEngine`] takes the transcript, runs the model until it
//! stops asking for tools, and hands back the final assistant text as the
//! chunks it streamed. Tool traffic is written to the transcript; the final
//! assistant message is not, that is the caller's job.

use crate::error::AgentError;
use async_trait::async_trait;
use retrievalbot_core::error::ToolError;
use retrievalbot_core::event::{DomainEvent, EventBus};
use retrievalbot_core::message::{Conversation, Message, MessageToolCall};
use retrievalbot_core::provider::{
    ChunkReceiver, Provider, ProviderRequest, ResponseFormat, Usage,
};
use retrievalbot_core::tool::{Tool, ToolCall, ToolRegistry};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[async_trait]
pub trait CompletionEngine: Send + Sync {
    /// Run one completion against `conversation` and return the reply chunks
    /// in emission order.
    async fn complete(
        &self,
        conversation: &mut Conversation,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, AgentError>;
}

/// [`CompletionEngine`] over a streaming [`Provider`] and a tool registry.
pub struct CompletionAdapter<T: Tool> {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    instructions: String,
    tools: ToolRegistry<T>,
    max_tool_iterations: u32,
    event_bus: Arc<EventBus>,
}

/// What one streamed round produced.
struct Round {
    chunks: Vec<String>,
    tool_calls: Vec<MessageToolCall>,
    usage: Option<Usage>,
}

impl<T: Tool> CompletionAdapter<T> {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        instructions: impl Into<String>,
        tools: ToolRegistry<T>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            instructions: instructions.into(),
            tools,
            max_tool_iterations: 10,
            event_bus,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_max_tool_iterations(mut self, max: u32) -> Self {
        self.max_tool_iterations = max;
        self
    }

    fn request(&self, conversation: &Conversation) -> ProviderRequest {
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        messages.push(Message::system(&self.instructions));
        messages.extend_from_slice(conversation.messages());

        ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: self.tools.describe(),
            response_format: Some(ResponseFormat::JsonObject),
            stream: true,
        }
    }

    async fn drain(
        mut rx: ChunkReceiver,
        cancel: &CancellationToken,
    ) -> Result<Round, AgentError> {
        let mut round = Round {
            chunks: Vec::new(),
            tool_calls: Vec::new(),
            usage: None,
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                next = rx.recv() => next,
            };

            let Some(chunk) = next else { break };
            let chunk = chunk?;

            if let Some(content) = chunk.content.filter(|c| !c.is_empty()) {
                round.chunks.push(content);
            }
            round.tool_calls.extend(chunk.tool_calls);
            if chunk.usage.is_some() {
                round.usage = chunk.usage;
            }
            if chunk.done {
                break;
            }
        }

        Ok(round)
    }

    /// Run one tool call. Model mistakes come back as text for the model;
    /// infrastructure failures abort the turn.
    async fn run_tool(&self, tc: &MessageToolCall) -> Result<String, AgentError> {
        let arguments = if tc.arguments.trim().is_empty() {
            Ok(serde_json::json!({}))
        } else {
            serde_json::from_str(&tc.arguments)
                .map_err(|e| ToolError::InvalidArguments(format!("arguments are not JSON: {e}")))
        };

        let start = std::time::Instant::now();
        let result = match arguments {
            Ok(arguments) => {
                let call = ToolCall {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    arguments,
                };
                self.tools.execute(&call).await
            }
            Err(e) => Err(e),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        self.event_bus.publish(DomainEvent::ToolExecuted {
            tool_name: tc.name.clone(),
            success: result.as_ref().is_ok_and(|r| r.success),
            duration_ms,
            timestamp: chrono::Utc::now(),
        });

        match result {
            Ok(tool_result) => Ok(tool_result.output),
            Err(e @ ToolError::ExecutionFailed { .. }) => Err(e.into()),
            Err(e) => {
                warn!(tool = %tc.name, error = %e, "Tool call rejected");
                Ok(format!("Error: {e}"))
            }
        }
    }
}

#[async_trait]
impl<T: Tool> CompletionEngine for CompletionAdapter<T> {
    async fn complete(
        &self,
        conversation: &mut Conversation,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, AgentError> {
        for iteration in 1..=self.max_tool_iterations {
            debug!(
                conversation_id = %conversation.id,
                iteration,
                "Completion round"
            );

            let request = self.request(conversation);
            let rx = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                rx = self.provider.stream(request) => rx?,
            };
            let round = Self::drain(rx, cancel).await?;

            if let Some(usage) = round.usage {
                self.event_bus.publish(DomainEvent::ResponseGenerated {
                    conversation_id: conversation.id.to_string(),
                    model: self.model.clone(),
                    tokens_used: usage.total_tokens,
                    timestamp: chrono::Utc::now(),
                });
            }

            if round.tool_calls.is_empty() {
                return Ok(round.chunks);
            }

            debug!(tool_count = round.tool_calls.len(), "Executing tool calls");

            let mut results = Vec::with_capacity(round.tool_calls.len());
            for tc in &round.tool_calls {
                let output = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                    output = self.run_tool(tc) => output?,
                };
                results.push(Message::tool_result(&tc.id, output));
            }

            conversation.push(Message::assistant_tool_calls(
                round.chunks.concat(),
                round.tool_calls,
            ));
            for result in results {
                conversation.push(result);
            }
        }

        warn!(
            conversation_id = %conversation.id,
            limit = self.max_tool_iterations,
            "Tool loop limit reached"
        );
        Err(AgentError::ToolLoopExhausted(self.max_tool_iterations))
    }
}
