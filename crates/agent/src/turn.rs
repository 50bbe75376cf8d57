//! Turn handler: channel events in, rendered messages out.

use crate::completion::CompletionAdapter;
use crate::error::AgentError;
use crate::instructions::system_instructions;
use crate::orchestrator::Orchestrator;
use crate::response::{ContentType, StructuredResponse};
use crate::store::ConversationStore;
use chrono::{NaiveDateTime, Utc};
use retrievalbot_config::AppConfig;
use retrievalbot_core::channel::{ChannelAccount, InboundTurn, OutboundMessage};
use retrievalbot_core::event::{DomainEvent, EventBus};
use retrievalbot_core::message::ConversationId;
use retrievalbot_core::provider::Provider;
use retrievalbot_tools::{Clock, GraphEndpoints, RetrievalSettings, ToolContext, build_registry};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// The only thing a user sees when a turn fails.
pub const APOLOGY: &str =
    "Sorry, I ran into a problem responding to your query. Please try again.";

pub struct TurnHandler {
    provider: Arc<dyn Provider>,
    model: String,
    config: AppConfig,
    instructions: String,
    event_start: NaiveDateTime,
    store: Arc<ConversationStore>,
    event_bus: Arc<EventBus>,
    clock: Clock,
}

impl TurnHandler {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        config: AppConfig,
        event_bus: Arc<EventBus>,
    ) -> Result<Self, AgentError> {
        let event_start = config.agent.event_start()?;
        let instructions = system_instructions(&config.agent);

        Ok(Self {
            provider,
            model: model.into(),
            config,
            instructions,
            event_start,
            store: Arc::new(ConversationStore::new()),
            event_bus,
            clock: Clock::System,
        })
    }

    /// Build a handler around the configured default provider.
    pub fn from_config(config: AppConfig, event_bus: Arc<EventBus>) -> Result<Self, AgentError> {
        let router = retrievalbot_providers::build_from_config(&config)?;
        let (provider, model) = router.resolve_default()?;
        info!(provider = provider.name(), model = %model, "Using completion provider");
        Self::new(provider, model, config, event_bus)
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    /// Handle one channel event and return what to send back, in order.
    pub async fn handle(
        &self,
        turn: InboundTurn,
        cancel: &CancellationToken,
    ) -> Vec<OutboundMessage> {
        match turn {
            InboundTurn::Message {
                text,
                conversation_id,
                graph_token,
            } => {
                let reply = match self
                    .respond(&text, &conversation_id, graph_token, cancel)
                    .await
                {
                    Ok(response) => render(response),
                    Err(e) => {
                        error!(conversation_id = %conversation_id, error = %e, "Turn failed");
                        self.event_bus.publish(DomainEvent::TurnFailed {
                            conversation_id: conversation_id.to_string(),
                            error_message: e.to_string(),
                            timestamp: Utc::now(),
                        });
                        OutboundMessage::text(APOLOGY)
                    }
                };
                vec![OutboundMessage::Typing, reply]
            }
            InboundTurn::MembersAdded {
                members,
                recipient_id,
                ..
            } => self.welcome(&members, &recipient_id),
        }
    }

    fn welcome(&self, members: &[ChannelAccount], recipient_id: &str) -> Vec<OutboundMessage> {
        members
            .iter()
            .filter(|m| m.id != recipient_id)
            .map(|_| OutboundMessage::text(&self.config.gateway.welcome_message))
            .collect()
    }

    async fn respond(
        &self,
        text: &str,
        conversation_id: &ConversationId,
        graph_token: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<StructuredResponse, AgentError> {
        self.event_bus.publish(DomainEvent::TurnReceived {
            conversation_id: conversation_id.to_string(),
            content_preview: text.chars().take(80).collect(),
            timestamp: Utc::now(),
        });

        let shared = self.store.get_or_create(conversation_id).await;
        let mut conversation = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            guard = shared.lock() => guard,
        };

        let tools = build_registry(self.tool_context(graph_token))?;
        let adapter = CompletionAdapter::new(
            self.provider.clone(),
            self.model.clone(),
            self.instructions.clone(),
            tools,
            self.event_bus.clone(),
        )
        .with_temperature(self.config.default_temperature)
        .with_max_tokens(self.config.default_max_tokens)
        .with_max_tool_iterations(self.config.agent.max_tool_iterations);

        Orchestrator::new(adapter, self.event_bus.clone())
            .with_max_retries(self.config.agent.max_retries)
            .invoke_turn(text, &mut conversation, cancel)
            .await
    }

    fn tool_context(&self, graph_token: Option<String>) -> ToolContext {
        let retrieval = &self.config.retrieval;
        ToolContext {
            graph: GraphEndpoints {
                base_url: self.config.graph.base_url.clone(),
                beta_url: self.config.graph.beta_url.clone(),
            },
            graph_token: graph_token.or_else(|| self.config.graph.access_token.clone()),
            retrieval: RetrievalSettings {
                filter_expression: retrieval.filter_expression.clone(),
                max_results: retrieval.max_results,
                data_source: retrieval.data_source.clone(),
            },
            event_start: self.event_start,
            card_provider: self.provider.clone(),
            card_model: self.model.clone(),
            clock: self.clock,
        }
    }
}

fn render(response: StructuredResponse) -> OutboundMessage {
    match response.content_type {
        ContentType::Text => OutboundMessage::text(response.content),
        ContentType::AdaptiveCard => OutboundMessage::adaptive_card(response.content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use retrievalbot_core::channel::ADAPTIVE_CARD_CONTENT_TYPE;
    use retrievalbot_core::error::ProviderError;
    use retrievalbot_core::message::Role;

    fn handler(provider: Arc<SequentialMockProvider>) -> TurnHandler {
        TurnHandler::new(
            provider,
            "mock-model",
            AppConfig::default(),
            Arc::new(EventBus::default()),
        )
        .unwrap()
    }

    fn message(text: &str, conversation: &str) -> InboundTurn {
        InboundTurn::Message {
            text: text.into(),
            conversation_id: conversation.into(),
            graph_token: None,
        }
    }

    #[tokio::test]
    async fn text_reply_is_typed_then_sent() {
        let provider = Arc::new(SequentialMockProvider::texts(&[text_reply("Hello!")]));
        let handler = handler(provider);

        let out = handler
            .handle(message("Hi", "c1"), &CancellationToken::new())
            .await;
        assert_eq!(
            out,
            vec![OutboundMessage::Typing, OutboundMessage::text("Hello!")]
        );
    }

    #[tokio::test]
    async fn adaptive_card_reply_becomes_attachment() {
        let card = r#"{"type":"AdaptiveCard","version":"1.5","body":[]}"#;
        let reply = serde_json::json!({"contentType": "AdaptiveCard", "content": card}).to_string();
        let handler = handler(Arc::new(SequentialMockProvider::texts(&[reply])));

        let out = handler
            .handle(message("Show my sessions", "c1"), &CancellationToken::new())
            .await;
        assert_eq!(
            out[1],
            OutboundMessage::Attachment {
                content_type: ADAPTIVE_CARD_CONTENT_TYPE.into(),
                content: card.into(),
            }
        );
    }

    #[tokio::test]
    async fn exhausted_retries_render_apology() {
        let provider = Arc::new(SequentialMockProvider::texts(&["nope"; 4]));
        let handler = handler(provider.clone());

        let out = handler
            .handle(message("Hi", "c1"), &CancellationToken::new())
            .await;
        assert_eq!(out[1], OutboundMessage::text(APOLOGY));
        assert_eq!(provider.call_count(), 4);
        assert_eq!(handler.store().snapshot(&"c1".into()).await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn provider_failure_renders_apology_and_event() {
        let provider = Arc::new(SequentialMockProvider::with_outcomes(vec![Err(
            ProviderError::AuthenticationFailed("bad key".into()),
        )]));
        let handler = handler(provider);
        let mut events = handler.event_bus().subscribe();

        let out = handler
            .handle(message("Hi", "c1"), &CancellationToken::new())
            .await;
        assert_eq!(out[1], OutboundMessage::text(APOLOGY));

        let mut failed = false;
        while let Ok(event) = events.try_recv() {
            if let DomainEvent::TurnFailed { error_message, .. } = event.as_ref() {
                assert!(error_message.contains("bad key"));
                failed = true;
            }
        }
        assert!(failed);
    }

    #[tokio::test]
    async fn history_carries_across_turns() {
        let provider = Arc::new(SequentialMockProvider::texts(&[
            text_reply("one"),
            text_reply("two"),
        ]));
        let handler = handler(provider.clone());
        let cancel = CancellationToken::new();

        handler.handle(message("first", "c1"), &cancel).await;
        handler.handle(message("second", "c1"), &cancel).await;

        // system + 2 prior entries + new user entry
        let second = &provider.requests()[1];
        assert_eq!(second.messages.len(), 4);
        assert_eq!(second.messages[1].content, "first");
        assert_eq!(second.messages[3].content, "second");
    }

    #[tokio::test]
    async fn conversations_are_kept_apart() {
        let provider = Arc::new(SequentialMockProvider::texts(&[
            text_reply("a"),
            text_reply("b"),
        ]));
        let handler = handler(provider.clone());
        let cancel = CancellationToken::new();

        handler.handle(message("for a", "a"), &cancel).await;
        handler.handle(message("for b", "b"), &cancel).await;

        assert_eq!(provider.requests()[1].messages.len(), 2);
        assert_eq!(handler.store().len().await, 2);
    }

    #[tokio::test]
    async fn date_tool_runs_inside_turn() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![make_tool_call(
                "current_date_time",
                serde_json::json!({"format": "date"}),
            )]),
            make_text_response(&text_reply("Today is Sunday, January 12, 2025.")),
        ]));
        let now = NaiveDateTime::parse_from_str("2025-01-12T21:15:00", "%Y-%m-%dT%H:%M:%S")
            .unwrap();
        let handler = handler(provider).with_clock(Clock::Fixed(now));

        let out = handler
            .handle(message("What's today's date?", "c1"), &CancellationToken::new())
            .await;
        assert_eq!(
            out[1],
            OutboundMessage::text("Today is Sunday, January 12, 2025.")
        );

        let transcript = handler.store().snapshot(&"c1".into()).await.unwrap();
        let tool_msg = transcript.iter().find(|m| m.role == Role::Tool).unwrap();
        assert_eq!(tool_msg.content, "Sunday, January 12, 2025");
    }

    #[tokio::test]
    async fn members_added_welcomes_everyone_but_the_bot() {
        let handler = handler(Arc::new(SequentialMockProvider::new(vec![])));
        let turn = InboundTurn::MembersAdded {
            conversation_id: "c1".into(),
            members: vec![
                ChannelAccount {
                    id: "bot".into(),
                    name: Some("BuildGenie".into()),
                },
                ChannelAccount {
                    id: "user-1".into(),
                    name: None,
                },
            ],
            recipient_id: "bot".into(),
        };

        let out = handler.handle(turn, &CancellationToken::new()).await;
        assert_eq!(out.len(), 1);
        assert!(out[0].display_text().unwrap().starts_with("Hello! I am Build Genie!"));
    }

    #[tokio::test]
    async fn cancelled_turn_apologises_without_calling_model() {
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        let handler = handler(provider.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let out = handler.handle(message("Hi", "c1"), &cancel).await;
        assert_eq!(out[1], OutboundMessage::text(APOLOGY));
        assert_eq!(provider.call_count(), 0);
    }
}
