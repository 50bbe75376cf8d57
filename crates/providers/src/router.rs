//! Provider router: selects the correct LLM provider based on config.

use crate::openai_compat::OpenAiCompatProvider;
use retrievalbot_config::{AppConfig, ProviderConfig};
use retrievalbot_core::error::ProviderError;
use retrievalbot_core::provider::Provider;
use std::collections::HashMap;
use std::sync::Arc;

/// Name under which Azure OpenAI deployments are configured.
pub const AZURE_OPENAI: &str = "azure_openai";

/// Routes LLM requests to the correct provider.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
    default_model: String,
}

impl ProviderRouter {
    pub fn new(default_provider: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
            default_model: default_model.into(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// The default provider paired with the model name to put in requests.
    pub fn resolve_default(&self) -> Result<(Arc<dyn Provider>, String), ProviderError> {
        let provider = self
            .default()
            .ok_or_else(|| ProviderError::NotConfigured(self.default_provider.clone()))?;
        Ok((provider, self.default_model.clone()))
    }

    pub fn list(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }
}

/// Build providers from configuration.
///
/// For Azure the deployment name doubles as the request model.
pub fn build_from_config(config: &AppConfig) -> Result<ProviderRouter, ProviderError> {
    let default_model = match config.default_provider_config() {
        Some(pc) if config.default_provider == AZURE_OPENAI => pc
            .deployment
            .clone()
            .unwrap_or_else(|| config.default_model.clone()),
        _ => config.default_model.clone(),
    };
    let mut router = ProviderRouter::new(&config.default_provider, default_model);

    for (name, provider_config) in &config.providers {
        let provider = build_provider(name, provider_config, config)?;
        router.register(name.clone(), provider);
    }

    // Ensure the default provider exists (even if not explicitly configured)
    if router.get(&config.default_provider).is_none() {
        let provider = build_provider(
            &config.default_provider,
            &ProviderConfig::default(),
            config,
        )?;
        router.register(config.default_provider.clone(), provider);
    }

    Ok(router)
}

fn build_provider(
    name: &str,
    provider_config: &ProviderConfig,
    config: &AppConfig,
) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = provider_config
        .api_key
        .clone()
        .or_else(|| config.api_key.clone())
        .unwrap_or_default();

    if name == AZURE_OPENAI {
        let endpoint = provider_config.api_url.as_deref().ok_or_else(|| {
            ProviderError::NotConfigured("providers.azure_openai.api_url is required".into())
        })?;
        let deployment = provider_config.deployment.as_deref().ok_or_else(|| {
            ProviderError::NotConfigured("providers.azure_openai.deployment is required".into())
        })?;
        return Ok(Arc::new(OpenAiCompatProvider::azure(
            endpoint,
            deployment,
            api_key,
            provider_config.api_version.as_deref(),
        )));
    }

    let base_url = provider_config
        .api_url
        .clone()
        .unwrap_or_else(|| default_base_url(name));
    Ok(Arc::new(OpenAiCompatProvider::new(name, base_url, api_key)))
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openai_compat::Endpoint;

    #[test]
    fn router_register_and_lookup() {
        let mut router = ProviderRouter::new("openai", "gpt-4o");
        router.register("openai", Arc::new(OpenAiCompatProvider::openai("sk-test")));

        assert!(router.get("openai").is_some());
        assert!(router.get("nonexistent").is_none());
        let (_, model) = router.resolve_default().unwrap();
        assert_eq!(model, "gpt-4o");
    }

    #[test]
    fn missing_default_is_not_configured() {
        let router = ProviderRouter::new("openai", "gpt-4o");
        assert!(matches!(
            router.resolve_default(),
            Err(ProviderError::NotConfigured(_))
        ));
    }

    #[test]
    fn build_from_default_config() {
        let router = build_from_config(&AppConfig::default()).unwrap();
        assert_eq!(router.default().unwrap().name(), "openai");
    }

    #[test]
    fn azure_uses_deployment_as_model() {
        let mut config = AppConfig {
            default_provider: AZURE_OPENAI.into(),
            ..AppConfig::default()
        };
        config.providers.insert(
            AZURE_OPENAI.into(),
            ProviderConfig {
                api_key: Some("k".into()),
                api_url: Some("https://contoso.openai.azure.com".into()),
                deployment: Some("build-genie".into()),
                api_version: None,
            },
        );

        let router = build_from_config(&config).unwrap();
        let (provider, model) = router.resolve_default().unwrap();
        assert_eq!(provider.name(), AZURE_OPENAI);
        assert_eq!(model, "build-genie");
    }

    #[test]
    fn azure_without_endpoint_fails() {
        let config = AppConfig {
            default_provider: AZURE_OPENAI.into(),
            ..AppConfig::default()
        };
        assert!(matches!(
            build_from_config(&config),
            Err(ProviderError::NotConfigured(_))
        ));
    }

    #[test]
    fn openai_default_endpoint() {
        let provider = OpenAiCompatProvider::new("openai", default_base_url("openai"), "k");
        assert_eq!(
            provider.endpoint(),
            &Endpoint::OpenAi {
                base_url: "https://api.openai.com/v1".into()
            }
        );
    }
}
