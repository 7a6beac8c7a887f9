// /permission request: opens the request form.
//
// Everything after the form is submitted lives in the request handler, since
// it arrives as modal and button interactions rather than commands.

use crate::core::cooldowns::CooldownKey;
use crate::discord::request_handler::{self, REQUEST_COOLDOWN};
use crate::discord::{Data, Error};
use poise::serenity_prelude as serenity;

type ApplicationContext<'a> = poise::ApplicationContext<'a, Data, Error>;

/// Permission commands
#[poise::command(slash_command, guild_only, subcommands("request"))]
pub async fn permission(_ctx: ApplicationContext<'_>) -> Result<(), Error> {
    Ok(())
}

/// Request permission for a roleplay
#[poise::command(slash_command, guild_only)]
pub async fn request(ctx: ApplicationContext<'_>) -> Result<(), Error> {
    let context = poise::Context::Application(ctx);
    let data = context.data();
    let key = CooldownKey::new(REQUEST_COOLDOWN, context.author().id.get());
    let window = chrono::Duration::seconds(data.settings.request_cooldown_secs);

    if let Some(left) = data.cooldowns.remaining(&key, window) {
        ctx.interaction
            .create_response(
                context.serenity_context(),
                serenity::CreateInteractionResponse::Message(
                    serenity::CreateInteractionResponseMessage::new()
                        .content(request_handler::cooldown_message(left))
                        .ephemeral(true),
                ),
            )
            .await?;
        return Ok(());
    }

    ctx.interaction
        .create_response(
            context.serenity_context(),
            serenity::CreateInteractionResponse::Modal(request_handler::request_form()),
        )
        .await?;
    Ok(())
}
