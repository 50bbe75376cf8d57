//! The turn orchestrator: ask, decode, and correct.
//!
//! Each attempt appends a user entry and the model's reply to the
//! transcript, then decodes the reply. A reply that fails to decode earns a
//! corrective message and another attempt, up to `max_retries` extra
//! attempts. Transport failures are never retried here.

use crate::completion::CompletionEngine;
use crate::error::{AgentError, DecodeError};
use crate::response::{StructuredResponse, parse};
use chrono::Utc;
use retrievalbot_core::event::{DomainEvent, EventBus};
use retrievalbot_core::message::{Conversation, Message};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// The feedback sent back to the model after a reply fails to decode.
pub fn corrective_message(error: &DecodeError) -> String {
    format!("That response did not match the expected format. Please try again. Error: {error}")
}

pub struct Orchestrator<E: CompletionEngine> {
    engine: E,
    max_retries: u32,
    event_bus: Arc<EventBus>,
}

impl<E: CompletionEngine> Orchestrator<E> {
    pub fn new(engine: E, event_bus: Arc<EventBus>) -> Self {
        Self {
            engine,
            max_retries: DEFAULT_MAX_RETRIES,
            event_bus,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Run one user turn to a decoded reply.
    ///
    /// At most `max_retries + 1` attempts are made; the retry budget is local
    /// to this call.
    pub async fn invoke_turn(
        &self,
        user_input: &str,
        conversation: &mut Conversation,
        cancel: &CancellationToken,
    ) -> Result<StructuredResponse, AgentError> {
        let mut input = user_input.to_string();
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            debug!(conversation_id = %conversation.id, attempt, "Invoking agent");
            conversation.push(Message::user(input));

            let chunks = self.engine.complete(conversation, cancel).await?;
            let reply = chunks.concat();
            conversation.push(Message::assistant(reply.clone()));

            let error = match parse(&reply) {
                Ok(response) => {
                    info!(
                        conversation_id = %conversation.id,
                        attempts = attempt + 1,
                        content_type = %response.content_type,
                        "Agent replied"
                    );
                    return Ok(response);
                }
                Err(e) => e,
            };

            warn!(
                conversation_id = %conversation.id,
                attempt,
                error = %error,
                "Agent reply did not decode"
            );
            self.event_bus.publish(DomainEvent::ResponseRejected {
                conversation_id: conversation.id.to_string(),
                attempt,
                reason: error.reason.clone(),
                timestamp: Utc::now(),
            });

            if attempt >= self.max_retries {
                return Err(AgentError::MalformedResponse {
                    attempts: attempt + 1,
                    source: error,
                });
            }

            input = corrective_message(&error);
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::ContentType;
    use crate::test_helpers::text_reply;
    use async_trait::async_trait;
    use retrievalbot_core::error::ProviderError;
    use retrievalbot_core::message::Role;
    use std::sync::Mutex;

    /// Replies with scripted texts, one per call, each split into two chunks.
    struct ScriptedEngine {
        replies: Mutex<Vec<Result<String, ProviderError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedEngine {
        fn new(replies: Vec<String>) -> Self {
            Self::with_outcomes(replies.into_iter().map(Ok).collect())
        }

        fn with_outcomes(replies: Vec<Result<String, ProviderError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                calls: Mutex::new(0),
            }
        }

        fn repeating(reply: &str, times: usize) -> Self {
            Self::new(vec![reply.to_string(); times])
        }
    }

    #[async_trait]
    impl CompletionEngine for ScriptedEngine {
        async fn complete(
            &self,
            _conversation: &mut Conversation,
            _cancel: &CancellationToken,
        ) -> Result<Vec<String>, AgentError> {
            *self.calls.lock().unwrap() += 1;
            let reply = self.replies.lock().unwrap().remove(0)?;
            let mid = reply.len() / 2;
            let mid = (mid..=reply.len())
                .find(|i| reply.is_char_boundary(*i))
                .unwrap_or(reply.len());
            Ok(vec![reply[..mid].to_string(), reply[mid..].to_string()])
        }
    }

    fn orchestrator(engine: ScriptedEngine) -> Orchestrator<ScriptedEngine> {
        Orchestrator::new(engine, Arc::new(EventBus::default()))
    }

    #[tokio::test]
    async fn valid_first_reply_takes_one_attempt() {
        let orch = orchestrator(ScriptedEngine::new(vec![text_reply("Hello")]));
        let mut conv = Conversation::new();

        let response = orch
            .invoke_turn("Hi", &mut conv, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response, StructuredResponse::text("Hello"));
        assert_eq!(*orch.engine.calls.lock().unwrap(), 1);
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.messages()[0].content, "Hi");
        assert_eq!(conv.messages()[1].content, text_reply("Hello"));
    }

    #[tokio::test]
    async fn persistent_garbage_fails_after_four_attempts() {
        let orch = orchestrator(ScriptedEngine::repeating("not json", 10));
        let mut conv = Conversation::new();

        let err = orch
            .invoke_turn("Hi", &mut conv, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            AgentError::MalformedResponse { attempts, .. } => assert_eq!(attempts, 4),
            other => panic!("expected MalformedResponse, got {other:?}"),
        }
        assert_eq!(*orch.engine.calls.lock().unwrap(), 4);
        assert_eq!(conv.len(), 8);
    }

    #[tokio::test]
    async fn transcript_alternates_user_and_assistant() {
        let orch = orchestrator(ScriptedEngine::new(vec![
            "oops".to_string(),
            r#"{"contentType":"Video","content":"x"}"#.to_string(),
            text_reply("fixed"),
        ]));
        let mut conv = Conversation::new();

        orch.invoke_turn("Hi", &mut conv, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(conv.len(), 6);
        for (i, msg) in conv.messages().iter().enumerate() {
            let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
            assert_eq!(msg.role, expected, "entry {i}");
        }
        assert!(conv.messages()[2]
            .content
            .starts_with("That response did not match the expected format. Please try again. Error: "));
        assert!(conv.messages()[4].content.contains("Video"));
    }

    #[tokio::test]
    async fn missing_content_defaults_to_empty() {
        let orch = orchestrator(ScriptedEngine::new(vec![r#"{"contentType":"Text"}"#.to_string()]));
        let response = orch
            .invoke_turn("Hi", &mut Conversation::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.content_type, ContentType::Text);
        assert_eq!(response.content, "");
    }

    #[tokio::test]
    async fn todays_date_scenario() {
        let reply = text_reply("Today is Monday, May 12, 2025.");
        let orch = orchestrator(ScriptedEngine::new(vec![reply]));
        let mut conv = Conversation::new();

        let response = orch
            .invoke_turn("What's today's date?", &mut conv, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.content, "Today is Monday, May 12, 2025.");
        assert_eq!(conv.len(), 2);
    }

    #[tokio::test]
    async fn plain_text_apology_then_recovery() {
        let orch = orchestrator(ScriptedEngine::new(vec![
            "Sorry I cannot help".to_string(),
            text_reply("Here is what I found."),
        ]));
        let mut conv = Conversation::new();

        let response = orch
            .invoke_turn("Find my session", &mut conv, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.content, "Here is what I found.");
        assert_eq!(conv.len(), 4);
        assert!(conv.messages()[2].content.contains("Error: "));
    }

    #[tokio::test]
    async fn provider_failure_is_not_retried() {
        let orch = orchestrator(ScriptedEngine::with_outcomes(vec![
            Err(ProviderError::Network("connection refused".into())),
            Ok(text_reply("unreachable")),
        ]));
        let mut conv = Conversation::new();

        let err = orch
            .invoke_turn("Hi", &mut conv, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Provider(_)));
        assert_eq!(*orch.engine.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn retry_budget_is_fresh_each_turn() {
        let mut replies = vec!["bad".to_string(); 3];
        replies.push(text_reply("first"));
        replies.extend(vec!["bad".to_string(); 3]);
        replies.push(text_reply("second"));
        let orch = orchestrator(ScriptedEngine::new(replies));
        let mut conv = Conversation::new();
        let cancel = CancellationToken::new();

        let first = orch.invoke_turn("one", &mut conv, &cancel).await.unwrap();
        let second = orch.invoke_turn("two", &mut conv, &cancel).await.unwrap();
        assert_eq!(first.content, "first");
        assert_eq!(second.content, "second");
        assert_eq!(conv.len(), 16);
    }

    #[tokio::test]
    async fn zero_retries_means_one_attempt() {
        let orch = orchestrator(ScriptedEngine::repeating("bad", 2)).with_max_retries(0);
        let err = orch
            .invoke_turn("Hi", &mut Conversation::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::MalformedResponse { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn rejected_attempts_publish_events() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let orch = Orchestrator::new(
            ScriptedEngine::new(vec!["bad".to_string(), text_reply("ok")]),
            bus,
        );

        orch.invoke_turn("Hi", &mut Conversation::new(), &CancellationToken::new())
            .await
            .unwrap();

        let event = rx.try_recv().unwrap();
        match event.as_ref() {
            DomainEvent::ResponseRejected { attempt, .. } => assert_eq!(*attempt, 0),
            other => panic!("expected ResponseRejected, got {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancelled_before_start_appends_nothing() {
        let orch = orchestrator(ScriptedEngine::new(vec![]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut conv = Conversation::new();

        let err = orch.invoke_turn("Hi", &mut conv, &cancel).await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert!(conv.is_empty());
    }
}
