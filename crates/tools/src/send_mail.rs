//! Send mail as the signed-in user via Microsoft Graph `/me/sendMail`.

use crate::graph::GraphClient;
use async_trait::async_trait;
use retrievalbot_core::error::ToolError;
use retrievalbot_core::tool::{Tool, ToolResult};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

pub const MAIL_SENT: &str = "Mail sent successfully!";

pub struct SendMailTool {
    graph: Arc<GraphClient>,
}

impl SendMailTool {
    pub fn new(graph: Arc<GraphClient>) -> Self {
        Self { graph }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMailRequest<'a> {
    message: MailMessage<'a>,
    save_to_sent_items: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MailMessage<'a> {
    subject: &'a str,
    body: ItemBody<'a>,
    to_recipients: Vec<Recipient<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ItemBody<'a> {
    content_type: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Recipient<'a> {
    email_address: EmailAddress<'a>,
}

#[derive(Serialize)]
struct EmailAddress<'a> {
    address: &'a str,
}

fn required<'a>(arguments: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolError> {
    arguments[key]
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}

#[async_trait]
impl Tool for SendMailTool {
    fn name(&self) -> &str {
        "send_mail"
    }

    fn description(&self) -> &str {
        "Talks to the Microsoft Graph SendMail API and sends mail to a given email address \
         with a subject and a body text. Returns a success message."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "email": {
                    "type": "string",
                    "description": "The recipient's email address"
                },
                "subject": {
                    "type": "string",
                    "description": "The subject of the email"
                },
                "body": {
                    "type": "string",
                    "description": "The plain-text body of the email"
                }
            },
            "required": ["email", "subject", "body"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let email = required(&arguments, "email")?;
        let subject = required(&arguments, "subject")?;
        let body = required(&arguments, "body")?;

        let request = SendMailRequest {
            message: MailMessage {
                subject,
                body: ItemBody {
                    content_type: "Text",
                    content: body,
                },
                to_recipients: vec![Recipient {
                    email_address: EmailAddress { address: email },
                }],
            },
            save_to_sent_items: true,
        };
        let payload =
            serde_json::to_value(&request).map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().to_string(),
                reason: e.to_string(),
            })?;

        // Every failure is reported back to the model as text
        let outcome = match self.graph.post("me/sendMail", &payload).await {
            Ok(resp) if resp.is_success() => return Ok(ToolResult::ok(MAIL_SENT)),
            Ok(resp) => format!("{} {}", resp.status_name(), resp.body),
            Err(e) => e.to_string(),
        };

        warn!(error = %outcome, "Mail sending failed");
        Ok(ToolResult::failed(format!(
            "Mail sending failed: {}",
            outcome.trim()
        )))
    }
}
