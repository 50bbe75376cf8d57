//! Document retrieval through the Microsoft 365 Copilot Retrieval API.
//!
//! Queries the SharePoint library holding the Contoso Build 2025 session
//! documents and returns the matching extracts verbatim to the model.

use crate::graph::GraphClient;
use async_trait::async_trait;
use retrievalbot_core::error::ToolError;
use retrievalbot_core::tool::{Tool, ToolResult};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Scope and size of a retrieval query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalSettings {
    pub filter_expression: Option<String>,
    pub max_results: u32,
    pub data_source: String,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            filter_expression: None,
            max_results: 1,
            data_source: "sharePoint".into(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrievalRequest<'a> {
    query_string: &'a str,
    data_source: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter_expression: Option<&'a str>,
    maximum_number_of_results: u32,
}

pub struct RetrieveDocumentsTool {
    graph: Arc<GraphClient>,
    settings: RetrievalSettings,
}

impl RetrieveDocumentsTool {
    pub fn new(graph: Arc<GraphClient>, settings: RetrievalSettings) -> Self {
        Self { graph, settings }
    }
}

#[async_trait]
impl Tool for RetrieveDocumentsTool {
    fn name(&self) -> &str {
        "retrieve_documents"
    }

    fn description(&self) -> &str {
        "Uses the Microsoft Copilot Retrieval API to get Contoso Build 2025 session names, \
         descriptions, time slots, session types and speakers, including every Contoso and \
         Microsoft collaboration at the conference. Returns a relevant chunk of text and a \
         link to the source file."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The user's question, in natural language"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        let request = RetrievalRequest {
            query_string: query,
            data_source: &self.settings.data_source,
            filter_expression: self.settings.filter_expression.as_deref(),
            maximum_number_of_results: self.settings.max_results,
        };
        let payload = serde_json::to_value(&request).map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().to_string(),
            reason: e.to_string(),
        })?;

        debug!(query, "Copilot retrieval");
        let response = self.graph.post_beta("copilot/retrieval", &payload).await?;

        if !response.is_success() {
            warn!(status = %response.status, "Copilot retrieval failed");
            return Ok(ToolResult::failed(format!(
                "Retrieval failed: {} {}",
                response.status_name(),
                response.body.trim()
            )));
        }

        // Re-serialize compactly when the body is JSON; pass it through otherwise
        match serde_json::from_str::<serde_json::Value>(&response.body) {
            Ok(value) => Ok(ToolResult::ok(value.to_string()).with_data(value)),
            Err(_) => Ok(ToolResult::ok(response.body)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphEndpoints, test_server};
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::post;
    use std::sync::Mutex;

    fn client(base: &str) -> Arc<GraphClient> {
        Arc::new(GraphClient::new(
            GraphEndpoints {
                base_url: format!("{base}/v1.0"),
                beta_url: format!("{base}/beta"),
            },
            Some("tok".into()),
        ))
    }

    #[tokio::test]
    async fn posts_query_with_filter_and_cap() {
        let captured = Arc::new(Mutex::new(None::<serde_json::Value>));
        let sink = captured.clone();
        let app = Router::new().route(
            "/beta/copilot/retrieval",
            post(move |axum::Json(body): axum::Json<serde_json::Value>| {
                let sink = sink.clone();
                async move {
                    *sink.lock().unwrap() = Some(body);
                    axum::Json(serde_json::json!({
                        "retrievalHits": [{
                            "webUrl": "https://contoso.sharepoint.com/sites/Build/Sessions.docx",
                            "extracts": [{"text": "BRK101: Building agents, Room 4, 10:00"}]
                        }]
                    }))
                }
            }),
        );
        let base = test_server::serve(app).await;

        let settings = RetrievalSettings {
            filter_expression: Some("(path:\"https://contoso.sharepoint.com/sites/Build/\")".into()),
            ..RetrievalSettings::default()
        };
        let tool = RetrieveDocumentsTool::new(client(&base), settings);
        let result = tool
            .execute(serde_json::json!({"query": "Which sessions are about agents?"}))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.contains("BRK101"));
        assert!(result.data.is_some());

        let body = captured.lock().unwrap().clone().unwrap();
        assert_eq!(body["queryString"], "Which sessions are about agents?");
        assert_eq!(body["maximumNumberOfResults"], 1);
        assert_eq!(body["dataSource"], "sharePoint");
        assert!(body["filterExpression"].as_str().unwrap().contains("sharepoint"));
    }

    #[tokio::test]
    async fn remote_error_reported_to_model() {
        let app = Router::new().route(
            "/beta/copilot/retrieval",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let base = test_server::serve(app).await;
        let tool = RetrieveDocumentsTool::new(client(&base), RetrievalSettings::default());

        let result = tool
            .execute(serde_json::json!({"query": "keynote"}))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.output, "Retrieval failed: TooManyRequests slow down");
    }
}
