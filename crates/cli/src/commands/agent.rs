//! `retrievalbot agent`: interactive or single-message chat mode.

use anyhow::Context;
use retrievalbot_agent::TurnHandler;
use retrievalbot_config::AppConfig;
use retrievalbot_core::channel::{ChannelAccount, InboundTurn, OutboundMessage};
use retrievalbot_core::event::EventBus;
use retrievalbot_core::message::ConversationId;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

const BOT_ID: &str = "retrievalbot";
const USER_ID: &str = "terminal-user";

pub async fn run(message: Option<String>) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;

    if config.api_key.is_none()
        && config
            .default_provider_config()
            .and_then(|p| p.api_key.as_ref())
            .is_none()
    {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    OPENAI_API_KEY        = 'sk-...'   (OpenAI)");
        eprintln!("    AZURE_OPENAI_API_KEY  = '...'      (Azure OpenAI, with [providers.azure_openai])");
        eprintln!("    RETRIEVALBOT_API_KEY  = '...'      (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        anyhow::bail!("No API key found. See above for setup instructions.");
    }

    let agent_name = config.agent.name.clone();
    let provider_name = config.default_provider.clone();
    let model = config.default_model.clone();
    let handler = TurnHandler::from_config(config, Arc::new(EventBus::default()))?;
    let conversation_id = ConversationId(uuid::Uuid::new_v4().to_string());

    if let Some(msg) = message {
        let out = run_turn(&handler, user_message(msg, &conversation_id)).await;
        for reply in &out {
            if let Some(text) = reply.display_text() {
                println!("{text}");
            }
        }
        return Ok(());
    }

    println!();
    println!("  RetrievalBot: Interactive Mode");
    println!();
    println!("  Provider:  {provider_name}");
    println!("  Model:     {model}");
    println!("  Agent:     {agent_name}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' to quit; Ctrl+C cancels a reply in progress.");
    println!();

    let joined = InboundTurn::MembersAdded {
        conversation_id: conversation_id.clone(),
        members: vec![ChannelAccount {
            id: USER_ID.into(),
            name: None,
        }],
        recipient_id: BOT_ID.into(),
    };
    print_replies(&agent_name, &run_turn(&handler, joined).await);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }

        let out = run_turn(&handler, user_message(line.to_string(), &conversation_id)).await;
        print_replies(&agent_name, &out);
    }

    println!();
    println!("  Goodbye!");
    println!();

    Ok(())
}

fn user_message(text: String, conversation_id: &ConversationId) -> InboundTurn {
    InboundTurn::Message {
        text,
        conversation_id: conversation_id.clone(),
        graph_token: None,
    }
}

/// Run one turn; Ctrl+C while it runs cancels just this turn.
async fn run_turn(handler: &TurnHandler, turn: InboundTurn) -> Vec<OutboundMessage> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let out = handler.handle(turn, &cancel).await;
    watcher.abort();
    out
}

fn print_replies(agent_name: &str, replies: &[OutboundMessage]) {
    for reply in replies {
        match reply {
            OutboundMessage::Typing => eprint!("  ...\r"),
            OutboundMessage::Text { text } => {
                eprint!("     \r");
                println!();
                for line in text.lines() {
                    println!("  {agent_name} > {line}");
                }
                println!();
            }
            OutboundMessage::Attachment {
                content_type,
                content,
            } => {
                eprint!("     \r");
                println!();
                println!("  {agent_name} > [{content_type}]");
                let pretty = serde_json::from_str::<serde_json::Value>(content)
                    .and_then(|v| serde_json::to_string_pretty(&v))
                    .unwrap_or_else(|_| content.clone());
                for line in pretty.lines() {
                    println!("    {line}");
                }
                println!();
            }
        }
    }
}
