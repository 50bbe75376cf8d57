//! LLM Provider implementations for RetrievalBot.
//!
//! All providers implement the `retrievalbot_core::Provider` trait.
//! The router selects the correct provider based on configuration.

pub mod openai_compat;
pub mod router;

pub use openai_compat::{Endpoint, OpenAiCompatProvider};
pub use router::{ProviderRouter, build_from_config};
