//! Bot Framework activity mapping.
//!
//! Only the fields the bot reads or writes are modelled; anything else in
//! an incoming activity is ignored.

use retrievalbot_core::channel::{ChannelAccount, InboundTurn, OutboundMessage};
use retrievalbot_core::error::ChannelError;
use serde::{Deserialize, Serialize};

pub const MESSAGE: &str = "message";
pub const CONVERSATION_UPDATE: &str = "conversationUpdate";
pub const TYPING: &str = "typing";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members_added: Vec<ChannelAccount>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_data: Option<ChannelData>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRef {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelData {
    /// Microsoft Graph bearer token for the signed-in user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub content_type: String,
    pub content: serde_json::Value,
}

/// The body returned from the messaging endpoint.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ActivityBatch {
    pub activities: Vec<Activity>,
}

impl Activity {
    fn conversation_id(&self) -> Result<&str, ChannelError> {
        self.conversation
            .as_ref()
            .map(|c| c.id.as_str())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                ChannelError::InvalidPayload(format!(
                    "{} activity has no conversation id",
                    self.kind
                ))
            })
    }

    /// Turn an incoming activity into a bot turn.
    ///
    /// `Ok(None)` means the activity is valid but the bot has nothing to do
    /// with it (reactions, a conversationUpdate with nobody joining, ...).
    pub fn to_turn(&self) -> Result<Option<InboundTurn>, ChannelError> {
        match self.kind.as_str() {
            MESSAGE => Ok(Some(InboundTurn::Message {
                text: self.text.clone().unwrap_or_default(),
                conversation_id: self.conversation_id()?.into(),
                graph_token: self
                    .channel_data
                    .as_ref()
                    .and_then(|d| d.graph_token.clone()),
            })),
            CONVERSATION_UPDATE if !self.members_added.is_empty() => {
                let recipient = self.recipient.as_ref().ok_or_else(|| {
                    ChannelError::InvalidPayload("conversationUpdate has no recipient".into())
                })?;
                Ok(Some(InboundTurn::MembersAdded {
                    conversation_id: self.conversation_id()?.into(),
                    members: self.members_added.clone(),
                    recipient_id: recipient.id.clone(),
                }))
            }
            _ => Ok(None),
        }
    }

    /// Address an outbound message as a reply to this activity.
    pub fn reply(&self, message: OutboundMessage) -> Activity {
        let mut reply = Activity {
            conversation: self.conversation.clone(),
            from: self.recipient.clone(),
            recipient: self.from.clone(),
            ..Activity::default()
        };

        match message {
            OutboundMessage::Typing => reply.kind = TYPING.into(),
            OutboundMessage::Text { text } => {
                reply.kind = MESSAGE.into();
                reply.text = Some(text);
            }
            OutboundMessage::Attachment {
                content_type,
                content,
            } => {
                reply.kind = MESSAGE.into();
                // Cards travel as JSON objects; anything unparseable goes as a string.
                let content = serde_json::from_str(&content)
                    .unwrap_or(serde_json::Value::String(content));
                reply.attachments.push(Attachment {
                    content_type,
                    content,
                });
            }
        }
        reply
    }
}
