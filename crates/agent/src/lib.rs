//! The RetrievalBot agent.
//!
//! A turn flows through three layers:
//!
//! 1. [`TurnHandler`] maps a channel event to outbound messages and owns the
//!    per-conversation transcripts.
//! 2. [`Orchestrator`] asks the model for a structured reply and sends
//!    corrective feedback until one decodes or the retry budget runs out.
//! 3. [`CompletionAdapter`] drives the provider, executing tool calls until
//!    the model answers in text.

pub mod completion;
pub mod error;
pub mod instructions;
pub mod orchestrator;
pub mod response;
pub mod store;
pub mod turn;

#[cfg(test)]
mod test_helpers;

pub use completion::{CompletionAdapter, CompletionEngine};
pub use error::{AgentError, DecodeError};
pub use instructions::system_instructions;
pub use orchestrator::{DEFAULT_MAX_RETRIES, Orchestrator, corrective_message};
pub use response::{ContentType, StructuredResponse};
pub use store::{ConversationStore, SharedConversation};
pub use turn::{APOLOGY, TurnHandler};
