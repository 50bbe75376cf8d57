//! Errors raised while running a turn.

use retrievalbot_config::ConfigError;
use retrievalbot_core::error::{ProviderError, ToolError};

/// Why a model reply could not be decoded into a structured response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct DecodeError {
    pub reason: String,
}

impl DecodeError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Transport, auth, or quota failure talking to the model
    #[error("Completion engine failed: {0}")]
    Provider(#[from] ProviderError),

    /// A tool could not be set up or failed for infrastructure reasons
    #[error("Tool failure: {0}")]
    Tool(#[from] ToolError),

    #[error("Invalid agent configuration: {0}")]
    Config(#[from] ConfigError),

    /// The retry ceiling was reached and the last reply still did not decode
    #[error("Model reply did not match the expected format after {attempts} attempts: {source}")]
    MalformedResponse {
        attempts: u32,
        #[source]
        source: DecodeError,
    },

    #[error("Model kept calling tools past the limit of {0} rounds")]
    ToolLoopExhausted(u32),

    #[error("Turn cancelled")]
    Cancelled,
}
