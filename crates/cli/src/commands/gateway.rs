//! `retrievalbot gateway`: start the HTTP messaging endpoint.

use anyhow::Context;
use retrievalbot_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> anyhow::Result<()> {
    let mut config = AppConfig::load().context("Failed to load config")?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("RetrievalBot Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Endpoint:  POST /api/messages");
    println!("   Provider:  {} ({})", config.default_provider, config.default_model);

    retrievalbot_gateway::start(config).await?;

    Ok(())
}
