//! Built-in tool implementations for RetrievalBot.
//!
//! Tools give the agent its reach into the world: the current date, a
//! countdown to Build 2025, the user's contacts and mailbox through
//! Microsoft Graph, Copilot document retrieval, and Adaptive Card
//! rendering.
//!
//! The set is closed. [`Capability`] enumerates every tool and is what the
//! registry holds.

pub mod adaptive_card;
pub mod contacts;
pub mod date_time;
pub mod graph;
pub mod retrieval;
pub mod send_mail;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use retrievalbot_core::error::ToolError;
use retrievalbot_core::provider::Provider;
use retrievalbot_core::tool::{Tool, ToolRegistry, ToolResult};
use std::sync::Arc;

pub use adaptive_card::AdaptiveCardTool;
pub use contacts::ListContactsTool;
pub use date_time::{Clock, CurrentDateTimeTool, DaysUntilTool};
pub use graph::{GraphClient, GraphEndpoints, StaticTokenProvider};
pub use retrieval::{RetrievalSettings, RetrieveDocumentsTool};
pub use send_mail::SendMailTool;

/// Every tool the agent can call.
pub enum Capability {
    CurrentDateTime(CurrentDateTimeTool),
    DaysUntil(DaysUntilTool),
    ListContacts(ListContactsTool),
    SendMail(SendMailTool),
    RetrieveDocuments(RetrieveDocumentsTool),
    RenderAdaptiveCard(AdaptiveCardTool),
}

impl Capability {
    fn inner(&self) -> &dyn Tool {
        match self {
            Self::CurrentDateTime(t) => t,
            Self::DaysUntil(t) => t,
            Self::ListContacts(t) => t,
            Self::SendMail(t) => t,
            Self::RetrieveDocuments(t) => t,
            Self::RenderAdaptiveCard(t) => t,
        }
    }
}

#[async_trait]
impl Tool for Capability {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn description(&self) -> &str {
        self.inner().description()
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.inner().parameters_schema()
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        self.inner().execute(arguments).await
    }
}

/// Everything needed to build one turn's tools.
#[derive(Clone)]
pub struct ToolContext {
    pub graph: GraphEndpoints,
    /// The turn's Graph bearer token
    pub graph_token: Option<String>,
    pub retrieval: RetrievalSettings,
    pub event_start: NaiveDateTime,
    /// Model used for the nested Adaptive Card completion
    pub card_provider: Arc<dyn Provider>,
    pub card_model: String,
    pub clock: Clock,
}

/// Build the registry for one turn, in a fixed order.
pub fn build_registry(ctx: ToolContext) -> Result<ToolRegistry<Capability>, ToolError> {
    let graph = Arc::new(GraphClient::new(ctx.graph, ctx.graph_token));

    let mut registry = ToolRegistry::new();
    registry.register(Capability::CurrentDateTime(CurrentDateTimeTool::new(ctx.clock)))?;
    registry.register(Capability::DaysUntil(DaysUntilTool::new(
        ctx.clock,
        ctx.event_start,
    )))?;
    registry.register(Capability::ListContacts(ListContactsTool::new(graph.clone())))?;
    registry.register(Capability::SendMail(SendMailTool::new(graph.clone())))?;
    registry.register(Capability::RetrieveDocuments(RetrieveDocumentsTool::new(
        graph,
        ctx.retrieval,
    )))?;
    registry.register(Capability::RenderAdaptiveCard(AdaptiveCardTool::new(
        ctx.card_provider,
        ctx.card_model,
    )))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrievalbot_core::error::ProviderError;
    use retrievalbot_core::provider::{ProviderRequest, ProviderResponse};
    use retrievalbot_core::tool::ToolCall;

    struct Unused;

    #[async_trait]
    impl Provider for Unused {
        fn name(&self) -> &str {
            "unused"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::NotConfigured("unused".into()))
        }
    }

    fn context() -> ToolContext {
        let noon = NaiveDateTime::parse_from_str("2025-05-18T12:00:01", "%Y-%m-%dT%H:%M:%S")
            .unwrap();
        ToolContext {
            graph: GraphEndpoints::default(),
            graph_token: None,
            retrieval: RetrievalSettings::default(),
            event_start: noon + chrono::Duration::hours(12),
            card_provider: Arc::new(Unused),
            card_model: "gpt-4o".into(),
            clock: Clock::Fixed(noon),
        }
    }

    #[test]
    fn registry_declares_all_tools_in_order() {
        let registry = build_registry(context()).unwrap();
        let names: Vec<_> = registry.describe().into_iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec![
                "current_date_time",
                "days_until",
                "list_contacts",
                "send_mail",
                "retrieve_documents",
                "render_adaptive_card",
            ]
        );
    }

    #[test]
    fn every_schema_is_an_object() {
        let registry = build_registry(context()).unwrap();
        for def in registry.describe() {
            assert_eq!(def.parameters["type"], "object", "{}", def.name);
            assert!(!def.description.is_empty());
        }
    }

    #[tokio::test]
    async fn capability_dispatches_to_variant() {
        let registry = build_registry(context()).unwrap();
        let call = ToolCall {
            id: "call_1".into(),
            name: "days_until".into(),
            arguments: serde_json::json!({}),
        };
        let result = registry.execute(&call).await.unwrap();
        assert_eq!(result.output, "0.5");
    }
}
