// This is the entry point of the moderation bot.
//
// **Architecture Overview:**
// - `core/` = Ledger rules, cooldowns, pending requests (platform-agnostic)
// - `infra/` = Implementations of core traits (JSON files, legacy import)
// - `discord/` = Discord-specific adapters (commands, notifications, components)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Start the background sweep

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

mod config;

use crate::config::Settings;
use crate::core::clock::{Clock, SystemClock};
use crate::core::cooldowns::CooldownLimiter;
use crate::core::infractions::InfractionService;
use crate::core::requests::PendingRequests;
use crate::discord::{Data, Error};
use crate::infra::infractions::legacy_import::read_legacy_files;
use crate::infra::infractions::JsonInfractionStore;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Event handler for non-command Discord events.
/// Buttons and modal submissions for permission requests land here.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::InteractionCreate { interaction } => {
            if let Err(e) =
                discord::request_handler::handle_interaction(ctx, data, interaction).await
            {
                tracing::error!("Error handling interaction: {}", e);
            }
        }
        serenity::FullEvent::Ready { data_about_bot } => {
            tracing::info!(user = %data_about_bot.user.name, "Connected to Discord");
        }
        _ => {}
    }

    Ok(())
}

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            tracing::error!(
                command = %ctx.command().qualified_name,
                user_id = ctx.author().id.get(),
                "Command failed: {}",
                error
            );
            let reply = poise::CreateReply::default()
                .content("There was an error while executing this command!")
                .ephemeral(true);
            if let Err(e) = ctx.send(reply).await {
                tracing::warn!("Could not report command error: {}", e);
            }
        }
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                tracing::error!("Error while handling error: {}", e);
            }
        }
    }
}

/// Bring the legacy JSON files into an empty ledger, once.
async fn import_legacy(
    settings: &Settings,
    infractions: &InfractionService<JsonInfractionStore>,
) -> anyhow::Result<()> {
    if settings.legacy_infractions_file.is_none() && settings.legacy_moderation_file.is_none() {
        return Ok(());
    }
    if !infractions.is_empty().await {
        tracing::info!("Ledger already has records, skipping legacy import");
        return Ok(());
    }

    let drafts = read_legacy_files(
        settings.legacy_infractions_file.as_deref(),
        settings.legacy_moderation_file.as_deref(),
    )
    .await?;
    let imported = infractions.import(drafts).await?;
    tracing::info!(imported, "Legacy records imported");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // RUST_LOG controls verbosity; default to info for this crate
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Arc::new(Settings::from_env()?);

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // This is the "composition root" where we wire everything together.

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let store = JsonInfractionStore::new(settings.infractions_path());
    let infractions = Arc::new(InfractionService::load(store, Arc::clone(&clock)).await?);
    import_legacy(&settings, &infractions).await?;

    let cooldowns = Arc::new(CooldownLimiter::new(Arc::clone(&clock)));
    let requests = Arc::new(PendingRequests::new(
        Arc::clone(&clock),
        chrono::Duration::hours(settings.request_ttl_hours),
    ));

    let data = Data {
        settings: Arc::clone(&settings),
        infractions: Arc::clone(&infractions),
        cooldowns: Arc::clone(&cooldowns),
        requests: Arc::clone(&requests),
    };

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::non_privileged();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                discord::commands::infraction::infraction(),
                discord::commands::moderation::warn(),
                discord::commands::moderation::kick(),
                discord::commands::moderation::ban(),
                discord::commands::moderation::timeout(),
                discord::commands::moderation::softban(),
                discord::commands::moderation::unban(),
                discord::commands::moderation::view_moderation(),
                discord::commands::permission::permission(),
            ],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                tracing::info!("Bot is starting up...");

                // Guild registration shows up immediately; global can take an hour
                match data.settings.guild_id {
                    Some(guild_id) => {
                        poise::builtins::register_in_guild(
                            ctx,
                            &framework.options().commands,
                            serenity::GuildId::new(guild_id),
                        )
                        .await?;
                        tracing::info!(guild_id, "Commands registered in guild");
                    }
                    None => {
                        poise::builtins::register_globally(ctx, &framework.options().commands)
                            .await?;
                        tracing::info!("Commands registered globally");
                    }
                }

                ctx.set_activity(Some(serenity::ActivityData::watching("the server")));

                // Background sweep: expired infractions, stale requests, old cooldowns.
                let infractions = Arc::clone(&data.infractions);
                let requests = Arc::clone(&data.requests);
                let cooldowns = Arc::clone(&data.cooldowns);
                let interval_secs = data.settings.sweep_interval_secs;
                let cooldown_window =
                    chrono::Duration::seconds(data.settings.request_cooldown_secs);
                tokio::spawn(async move {
                    use std::time::Duration as StdDuration;

                    let mut interval = tokio::time::interval(StdDuration::from_secs(interval_secs));
                    loop {
                        interval.tick().await;
                        tracing::debug!("Sweep starting");

                        // The ledger is untouched on failure; next tick retries.
                        if let Err(e) = infractions.sweep_expired_now().await {
                            tracing::error!("Infraction sweep failed: {}", e);
                        }

                        let stale = requests.prune_expired();
                        let cooled = cooldowns.prune(cooldown_window);
                        tracing::debug!(stale, cooled, pending = requests.len(), "Sweep completed");
                    }
                });

                tracing::info!("Bot is ready!");
                Ok(data)
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(&settings.discord_token, intents)
        .framework(framework)
        .await?;

    client.start().await?;
    Ok(())
}
