//! Adaptive Card rendering through a nested model call.

use async_trait::async_trait;
use retrievalbot_core::error::ToolError;
use retrievalbot_core::message::Message;
use retrievalbot_core::provider::{Provider, ProviderRequest};
use retrievalbot_core::tool::{Tool, ToolResult};
use std::sync::Arc;

const CARD_INSTRUCTIONS: &str = "When given data, please generate an adaptive card that displays \
the information in a visually appealing way. Make sure to only return the valid adaptive card \
JSON string in the response.";

pub struct AdaptiveCardTool {
    provider: Arc<dyn Provider>,
    model: String,
}

impl AdaptiveCardTool {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Tool for AdaptiveCardTool {
    fn name(&self) -> &str {
        "render_adaptive_card"
    }

    fn description(&self) -> &str {
        "Generates an Adaptive Card JSON payload that presents the given data."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "data": {
                    "type": "string",
                    "description": "The data to show on the card"
                }
            },
            "required": ["data"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let data = arguments["data"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'data' argument".into()))?;

        let request = ProviderRequest::new(
            self.model.clone(),
            vec![Message::system(CARD_INSTRUCTIONS), Message::user(data)],
        );

        let response =
            self.provider
                .complete(request)
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    tool_name: self.name().to_string(),
                    reason: e.to_string(),
                })?;

        Ok(ToolResult::ok(response.message.content))
    }
}
