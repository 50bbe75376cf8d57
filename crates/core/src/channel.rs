//! Channel boundary types.
//!
//! The chat channel hands the bot one [`InboundTurn`] per event and gets
//! back a list of [`OutboundMessage`]s to deliver, in order.

use crate::message::ConversationId;
use serde::{Deserialize, Serialize};

/// Content type of an attachment that carries an Adaptive Card.
pub const ADAPTIVE_CARD_CONTENT_TYPE: &str = "application/vnd.microsoft.card.adaptive";

/// A participant in a channel conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAccount {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// One inbound channel event.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundTurn {
    /// A user typed something.
    Message {
        text: String,
        conversation_id: ConversationId,
        /// Bearer token for Microsoft Graph, if the channel supplied one
        graph_token: Option<String>,
    },

    /// Members joined the conversation.
    MembersAdded {
        conversation_id: ConversationId,
        members: Vec<ChannelAccount>,
        /// The bot's own account id; the bot does not welcome itself
        recipient_id: String,
    },
}

impl InboundTurn {
    pub fn conversation_id(&self) -> &ConversationId {
        match self {
            Self::Message {
                conversation_id, ..
            }
            | Self::MembersAdded {
                conversation_id, ..
            } => conversation_id,
        }
    }
}

/// One rendered message for the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// "The bot is typing" indicator
    Typing,

    /// Plain text
    Text { text: String },

    /// A rich attachment; `content` is delivered verbatim
    Attachment {
        content_type: String,
        content: String,
    },
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn adaptive_card(content: impl Into<String>) -> Self {
        Self::Attachment {
            content_type: ADAPTIVE_CARD_CONTENT_TYPE.to_string(),
            content: content.into(),
        }
    }

    /// The text a terminal would show for this message, if any.
    pub fn display_text(&self) -> Option<&str> {
        match self {
            Self::Typing => None,
            Self::Text { text } => Some(text),
            Self::Attachment { content, .. } => Some(content),
        }
    }
}
