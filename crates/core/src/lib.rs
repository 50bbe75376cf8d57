//! # RetrievalBot Core
//!
//! Domain types, traits, and error definitions shared by every RetrievalBot
//! crate. Nothing here talks to the network: the completion engine, the
//! tools and the chat channel are all described as traits or plain values,
//! and the other crates implement them.

pub mod channel;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use channel::{ADAPTIVE_CARD_CONTENT_TYPE, ChannelAccount, InboundTurn, OutboundMessage};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{Conversation, ConversationId, Message, MessageToolCall, Role};
pub use provider::{
    Provider, ProviderRequest, ProviderResponse, ResponseFormat, StreamChunk, ToolDefinition,
    Usage,
};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
