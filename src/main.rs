// This is the entry point of the gatekeeper bot.
//
// **Architecture Overview:**
// - `core/` = Admission pipeline (platform-agnostic)
// - `infra/` = Implementations of core traits (SQLite, HTTP clients)
// - `discord/` = Discord-specific adapters (transport, events, commands)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Register commands and the event handler

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::moderation::admission_classifier::DEFAULT_CALL_TIMEOUT;
use crate::core::moderation::{
    ChatSettingsService, LlmSpamClassifier, ModerationActions, ModerationPipeline,
};
use crate::discord::moderation::{commands, events, SerenityTransport};
use crate::discord::{presence, Data, Error};
use crate::infra::ai::openrouter_client::DEFAULT_OPENROUTER_URL;
use crate::infra::ai::OpenRouterClient;
use crate::infra::moderation::{LolsReputationClient, SqliteModerationStore, DEFAULT_REPUTATION_URL};
use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_MODEL: &str = "deepseek/deepseek-chat-v3.1:free";
/// Time given to early unbans after shutdown is requested.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let token = std::env::var("DISCORD_TOKEN").context(
        "Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.",
    )?;

    // Keep runtime databases in a dedicated folder so the repo root stays tidy.
    let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string());
    std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================

    let store = Arc::new(
        SqliteModerationStore::open(&format!("{}/moderation.db", data_dir))
            .await
            .context("Failed to initialize moderation database")?,
    );

    let reputation_url = std::env::var("REPUTATION_API_URL")
        .unwrap_or_else(|_| DEFAULT_REPUTATION_URL.to_string());
    let reputation = Arc::new(LolsReputationClient::new(reputation_url)?);

    let openrouter_api_key = std::env::var("OPENROUTER_API_KEY")
        .context("Missing OPENROUTER_API_KEY environment variable!")?;
    let openrouter_model =
        std::env::var("OPENROUTER_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
    let openrouter_url = std::env::var("OPENROUTER_BASE_URL")
        .unwrap_or_else(|_| DEFAULT_OPENROUTER_URL.to_string());
    let classifier = Arc::new(LlmSpamClassifier::new(
        OpenRouterClient::with_base_url(openrouter_api_key, &openrouter_url),
        openrouter_model,
    ));

    let call_timeout = std::env::var("CLASSIFIER_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_CALL_TIMEOUT);

    let shutdown = CancellationToken::new();
    let data_shutdown = shutdown.clone();

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to read message content
        | serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_MESSAGE_REACTIONS;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![commands::gatekeeper()],
            event_handler: |ctx, event, framework, data| {
                Box::pin(events::handle_event(ctx, event, framework.bot_id, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                tracing::info!("Commands registered");

                // The transport shares the gateway client's HTTP handle and rate limiter.
                let transport = Arc::new(SerenityTransport::new(ctx.http.clone()));
                let settings = Arc::new(ChatSettingsService::new(store.clone()));
                let actions =
                    ModerationActions::new(transport).with_shutdown(data_shutdown.clone());
                let pipeline = ModerationPipeline::new(
                    actions,
                    settings,
                    store,
                    reputation,
                    classifier,
                    call_timeout,
                );

                presence::on_ready(ctx);
                tracing::info!(?call_timeout, "Gatekeeper is ready");

                Ok::<_, Error>(Data {
                    pipeline: Arc::new(pipeline),
                    shutdown: data_shutdown,
                })
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .context("Error creating client")?;

    // Ctrl-C cancels running challenge batches and lifts time-boxed bans
    // before the shards go down.
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down");
            shutdown.cancel();
            tokio::time::sleep(SHUTDOWN_GRACE).await;
            shard_manager.shutdown_all().await;
        }
    });

    client.start().await.context("Error running bot")?;
    Ok(())
}
