//! Configuration loading, validation, and management for RetrievalBot.
//!
//! Loads configuration from `~/.retrievalbot/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Format of `agent.event_start` (a local wall-clock time).
pub const EVENT_START_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// The root configuration structure.
///
/// Maps directly to `~/.retrievalbot/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider ("openai", "azure_openai", or any OpenAI-compatible name)
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model (for Azure, the deployment name is used instead)
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub agent: AgentSettings,

    #[serde(default)]
    pub graph: GraphConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("providers", &self.providers)
            .field("agent", &self.agent)
            .field("graph", &self.graph)
            .field("retrieval", &self.retrieval)
            .field("gateway", &self.gateway)
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL (OpenAI-style) or resource endpoint (Azure)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Azure OpenAI deployment name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<String>,

    /// Azure OpenAI `api-version` query parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("deployment", &self.deployment)
            .field("api_version", &self.api_version)
            .finish()
    }
}

/// Agent behaviour: naming, retry ceiling, tool budget, instructions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Corrective retries after the first malformed response
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Completion rounds allowed per attempt while the model keeps calling tools
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,

    /// Replace the built-in persona (the reply schema is always appended)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Event start used by `days_until` when no target is given
    #[serde(default = "default_event_start")]
    pub event_start: String,
}

fn default_agent_name() -> String {
    "BuildGenie".into()
}
fn default_max_retries() -> u32 {
    3
}
fn default_max_tool_iterations() -> u32 {
    10
}
fn default_event_start() -> String {
    "2025-05-19T00:00:01".into()
}

impl AgentSettings {
    pub fn event_start(&self) -> Result<NaiveDateTime, ConfigError> {
        NaiveDateTime::parse_from_str(&self.event_start, EVENT_START_FORMAT).map_err(|e| {
            ConfigError::ValidationError(format!(
                "agent.event_start '{}' is not {EVENT_START_FORMAT}: {e}",
                self.event_start
            ))
        })
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            max_retries: default_max_retries(),
            max_tool_iterations: default_max_tool_iterations(),
            instructions: None,
            event_start: default_event_start(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_graph_base_url")]
    pub base_url: String,

    /// Beta endpoint (Copilot retrieval lives here)
    #[serde(default = "default_graph_beta_url")]
    pub beta_url: String,

    /// Fallback token when the channel does not supply one per turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

fn default_graph_base_url() -> String {
    "https://graph.microsoft.com/v1.0".into()
}
fn default_graph_beta_url() -> String {
    "https://graph.microsoft.com/beta".into()
}

impl std::fmt::Debug for GraphConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphConfig")
            .field("base_url", &self.base_url)
            .field("beta_url", &self.beta_url)
            .field("access_token", &redact(&self.access_token))
            .finish()
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: default_graph_base_url(),
            beta_url: default_graph_beta_url(),
            access_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// KQL filter scoping the search (e.g. a SharePoint path)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_expression: Option<String>,

    #[serde(default = "default_max_results")]
    pub max_results: u32,

    #[serde(default = "default_data_source")]
    pub data_source: String,
}

fn default_max_results() -> u32 {
    1
}
fn default_data_source() -> String {
    "sharePoint".into()
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            filter_expression: None,
            max_results: default_max_results(),
            data_source: default_data_source(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_welcome_message")]
    pub welcome_message: String,
}

fn default_port() -> u16 {
    3978
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_welcome_message() -> String {
    "Hello! I am Build Genie! I can help you prepare for Build Conference 2025!".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            welcome_message: default_welcome_message(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.retrievalbot/config.toml).
    ///
    /// Environment overrides:
    /// - `RETRIEVALBOT_API_KEY`, then `OPENAI_API_KEY`, then `AZURE_OPENAI_API_KEY`
    /// - `RETRIEVALBOT_PROVIDER`, `RETRIEVALBOT_MODEL`
    /// - `RETRIEVALBOT_GRAPH_TOKEN`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides from a lookup function.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("RETRIEVALBOT_API_KEY")
                .or_else(|| lookup("OPENAI_API_KEY"))
                .or_else(|| lookup("AZURE_OPENAI_API_KEY"));
        }

        if let Some(provider) = lookup("RETRIEVALBOT_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = lookup("RETRIEVALBOT_MODEL") {
            self.default_model = model;
        }

        if let Some(token) = lookup("RETRIEVALBOT_GRAPH_TOKEN") {
            self.graph.access_token = Some(token);
        }
    }

    pub fn config_dir() -> PathBuf {
        dirs_home().join(".retrievalbot")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.default_temperature) {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_retries > 10 {
            return Err(ConfigError::ValidationError(
                "agent.max_retries must be at most 10".into(),
            ));
        }

        if self.agent.max_tool_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tool_iterations must be at least 1".into(),
            ));
        }

        if self.retrieval.max_results == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.max_results must be at least 1".into(),
            ));
        }

        self.agent.event_start()?;
        Ok(())
    }

    /// Settings for the default provider, if any were configured.
    pub fn default_provider_config(&self) -> Option<&ProviderConfig> {
        self.providers.get(&self.default_provider)
    }

    /// A copy with every secret replaced, safe to print.
    pub fn redacted(&self) -> Self {
        let mask = |secret: &Option<String>| secret.as_ref().map(|_| "[REDACTED]".to_string());
        let mut config = self.clone();
        config.api_key = mask(&self.api_key);
        config.graph.access_token = mask(&self.graph.access_token);
        for provider in config.providers.values_mut() {
            provider.api_key = mask(&provider.api_key);
        }
        config
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            providers: HashMap::new(),
            agent: AgentSettings::default(),
            graph: GraphConfig::default(),
            retrieval: RetrievalConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "openai");
        assert_eq!(config.agent.max_retries, 3);
        assert_eq!(config.gateway.port, 3978);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.agent.event_start, config.agent.event_start);
        assert_eq!(parsed.graph.base_url, config.graph.base_url);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_event_start_rejected() {
        let mut config = AppConfig::default();
        config.agent.event_start = "May 19th".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("event_start"));
    }

    #[test]
    fn zero_tool_iterations_rejected() {
        let mut config = AppConfig::default();
        config.agent.max_tool_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_model, "gpt-4o");
    }

    #[test]
    fn load_azure_provider_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
default_provider = "azure_openai"

[providers.azure_openai]
api_key = "azure-secret"
api_url = "https://contoso.openai.azure.com"
deployment = "gpt-4o-prod"
api_version = "2024-06-01"

[agent]
max_retries = 2

[retrieval]
filter_expression = "(path:\"https://contoso.sharepoint.com/sites/Build/\")"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        let azure = config.default_provider_config().unwrap();
        assert_eq!(azure.deployment.as_deref(), Some("gpt-4o-prod"));
        assert_eq!(config.agent.max_retries, 2);
        assert_eq!(config.retrieval.max_results, 1);
        assert!(config.retrieval.filter_expression.unwrap().contains("sharepoint"));
    }

    #[test]
    fn unparseable_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_provider = [").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config.apply_env(|key| match key {
            "OPENAI_API_KEY" => Some("sk-env".into()),
            "RETRIEVALBOT_MODEL" => Some("gpt-4o-mini".into()),
            "RETRIEVALBOT_GRAPH_TOKEN" => Some("graph-token".into()),
            _ => None,
        });
        assert_eq!(config.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.default_model, "gpt-4o-mini");
        assert_eq!(config.graph.access_token.as_deref(), Some("graph-token"));
        assert_eq!(config.default_provider, "openai");
    }

    #[test]
    fn file_api_key_beats_env() {
        let mut config = AppConfig {
            api_key: Some("from-file".into()),
            ..AppConfig::default()
        };
        config.apply_env(|_| Some("from-env".into()));
        assert_eq!(config.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = AppConfig {
            api_key: Some("sk-very-secret".into()),
            ..AppConfig::default()
        };
        config.graph.access_token = Some("eyJ-token".into());
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("sk-very-secret"));
        assert!(!dbg.contains("eyJ-token"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn redacted_copy_hides_every_secret() {
        let mut config = AppConfig {
            api_key: Some("sk-top".into()),
            ..AppConfig::default()
        };
        config.providers.insert(
            "azure_openai".into(),
            ProviderConfig {
                api_key: Some("az-secret".into()),
                ..ProviderConfig::default()
            },
        );

        let shown = toml::to_string_pretty(&config.redacted()).unwrap();
        assert!(!shown.contains("sk-top"));
        assert!(!shown.contains("az-secret"));
        assert!(shown.contains("[REDACTED]"));
        assert_eq!(config.api_key.as_deref(), Some("sk-top"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("BuildGenie"));
        assert!(toml_str.contains("3978"));
    }
}
