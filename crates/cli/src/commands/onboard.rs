//! `retrievalbot onboard`: first-time setup.

use retrievalbot_config::AppConfig;

pub fn run() -> anyhow::Result<()> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("RetrievalBot: First-Time Setup");
    println!("==============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("Created config directory: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("Created config.toml at: {}", config_path.display());
    println!("\nNext steps:");
    println!("   1. Set OPENAI_API_KEY (or AZURE_OPENAI_API_KEY with [providers.azure_openai])");
    println!("   2. Optionally set RETRIEVALBOT_GRAPH_TOKEN for contacts, mail and retrieval");
    println!("   3. Run: retrievalbot agent\n");

    Ok(())
}
