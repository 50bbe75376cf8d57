//! `retrievalbot config`: configuration inspection.

use anyhow::Context;
use retrievalbot_config::AppConfig;

pub fn validate() -> anyhow::Result<()> {
    println!("Validating configuration...");

    let config = AppConfig::load().context("Config error")?;
    println!("   Config parsed and validated");

    let mut warnings = Vec::new();
    if config.api_key.is_none()
        && config
            .default_provider_config()
            .and_then(|p| p.api_key.as_ref())
            .is_none()
    {
        warnings.push("No API key set (set OPENAI_API_KEY or AZURE_OPENAI_API_KEY)");
    }
    if config.graph.access_token.is_none() {
        warnings.push(
            "No Graph token configured; contacts, mail and retrieval need one from the channel",
        );
    }

    for w in &warnings {
        println!("   warning: {w}");
    }

    println!();
    println!("   Provider:    {}", config.default_provider);
    println!("   Model:       {}", config.default_model);
    println!("   Agent:       {}", config.agent.name);
    println!("   Max retries: {}", config.agent.max_retries);
    println!("   Event start: {}", config.agent.event_start);
    println!(
        "   Gateway:     {}:{}",
        config.gateway.host, config.gateway.port
    );

    Ok(())
}

pub fn show() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    let toml_str = toml::to_string_pretty(&config.redacted())?;
    println!("{toml_str}");
    Ok(())
}

pub fn path() {
    println!("{}", AppConfig::config_dir().join("config.toml").display());
}
