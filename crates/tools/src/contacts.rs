//! Contact lookup via Microsoft Graph `/me/contacts`.

use crate::graph::GraphClient;
use async_trait::async_trait;
use retrievalbot_core::error::ToolError;
use retrievalbot_core::tool::{Tool, ToolResult};
use std::sync::Arc;
use tracing::warn;

pub struct ListContactsTool {
    graph: Arc<GraphClient>,
}

impl ListContactsTool {
    pub fn new(graph: Arc<GraphClient>) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl Tool for ListContactsTool {
    fn name(&self) -> &str {
        "list_contacts"
    }

    fn description(&self) -> &str {
        "Talks to Microsoft Graph and gets the user's contacts with their full name, \
         email address and office location."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let response = self.graph.get("me/contacts").await?;

        if response.is_success() {
            return Ok(ToolResult::ok(response.body));
        }

        // The model only sees the status name, e.g. "Unauthorized"
        warn!(status = %response.status, "Contacts lookup failed");
        Ok(ToolResult::failed(response.status_name()))
    }
}
