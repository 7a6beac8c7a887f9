// Moderation slash commands: warn, kick, ban, timeout, softban, unban.
//
// Each one performs the Discord action first, then records it in the ledger,
// then notifies. If Discord refuses the action nothing is recorded.

use crate::core::infractions::{Infraction, InfractionKind};
use crate::discord::commands::infraction::{notifier, reply_or_raise};
use crate::discord::notifier::{action_verb, discord_timestamp, field_text};
use crate::discord::permissions::{self, Clearance};
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

/// Discord's own ceiling on timeouts: 28 days.
const MAX_TIMEOUT_MINUTES: u32 = 28 * 24 * 60;
const MAX_LISTED: usize = 24;

fn kind_heading(kind: InfractionKind) -> &'static str {
    match kind {
        InfractionKind::Warn => "⚠️ Warning",
        InfractionKind::Kick => "👢 Kick",
        InfractionKind::Ban => "🔨 Ban",
        InfractionKind::Timeout => "⏰ Timeout",
        InfractionKind::Softban => "🔄 Softban",
        InfractionKind::Unban => "🔓 Unban",
        other => other.label(),
    }
}

async fn reply_ephemeral(ctx: Context<'_>, content: impl Into<String>) -> Result<(), Error> {
    ctx.send(
        poise::CreateReply::default()
            .content(content)
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Record an action that already happened on Discord, then notify.
/// False when the ledger refused it and the caller has already been told.
async fn record_and_notify(
    ctx: Context<'_>,
    target: &serenity::User,
    kind: InfractionKind,
    reason: &str,
    duration_minutes: Option<u32>,
    silent: bool,
) -> Result<bool, Error> {
    let result = ctx
        .data()
        .infractions
        .record_action(
            &target.id.to_string(),
            &ctx.author().id.to_string(),
            kind,
            reason,
            duration_minutes,
        )
        .await;

    let infraction = match result {
        Ok(inf) => inf,
        Err(e) => {
            reply_or_raise(ctx, e).await?;
            return Ok(false);
        }
    };

    let guild_name = ctx
        .partial_guild()
        .await
        .map(|g| g.name)
        .unwrap_or_else(|| "the server".to_string());

    notifier(ctx)
        .moderation_action(&infraction, target, ctx.author(), &guild_name, !silent)
        .await;

    Ok(true)
}

async fn confirm(
    ctx: Context<'_>,
    target: &serenity::User,
    kind: InfractionKind,
    extra: &str,
    silent: bool,
) -> Result<(), Error> {
    reply_ephemeral(
        ctx,
        format!(
            "Successfully {} {}{}{}.",
            action_verb(kind),
            target.tag(),
            extra,
            if silent { " silently" } else { "" }
        ),
    )
    .await
}

/// Warns a user in the server
#[poise::command(slash_command, guild_only)]
pub async fn warn(
    ctx: Context<'_>,
    #[description = "The user to warn"] target: serenity::User,
    #[description = "Reason for warning the user"]
    #[max_length = 1000]
    reason: String,
    #[description = "Whether to silently warn the user"] silent: Option<bool>,
) -> Result<(), Error> {
    if !permissions::require(ctx, Clearance::Moderator).await? {
        return Ok(());
    }
    ctx.defer_ephemeral().await?;
    let silent = silent.unwrap_or(false);

    if record_and_notify(ctx, &target, InfractionKind::Warn, &reason, None, silent)
        .await?
    {
        confirm(ctx, &target, InfractionKind::Warn, "", silent).await?;
    }
    Ok(())
}

/// Kicks a user from the server
#[poise::command(slash_command, guild_only)]
pub async fn kick(
    ctx: Context<'_>,
    #[description = "The user to kick"] target: serenity::User,
    #[description = "Reason for kicking the user"]
    #[max_length = 1000]
    reason: String,
    #[description = "Whether to silently kick the user"] silent: Option<bool>,
) -> Result<(), Error> {
    if !permissions::require(ctx, Clearance::Moderator).await? {
        return Ok(());
    }
    ctx.defer_ephemeral().await?;
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?;
    let silent = silent.unwrap_or(false);

    if let Err(e) = guild_id
        .kick_with_reason(ctx.http(), target.id, &reason)
        .await
    {
        tracing::warn!(target_id = target.id.get(), "Kick failed: {}", e);
        return reply_ephemeral(
            ctx,
            "I cannot kick this user. They may have higher permissions than me.",
        )
        .await;
    }

    if record_and_notify(ctx, &target, InfractionKind::Kick, &reason, None, silent)
        .await?
    {
        confirm(ctx, &target, InfractionKind::Kick, "", silent).await?;
    }
    Ok(())
}

/// Bans a user from the server
#[poise::command(slash_command, guild_only)]
pub async fn ban(
    ctx: Context<'_>,
    #[description = "The user to ban"] target: serenity::User,
    #[description = "Reason for banning the user"]
    #[max_length = 1000]
    reason: String,
    #[description = "Whether to silently ban the user"] silent: Option<bool>,
) -> Result<(), Error> {
    if !permissions::require(ctx, Clearance::Moderator).await? {
        return Ok(());
    }
    ctx.defer_ephemeral().await?;
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?;
    let silent = silent.unwrap_or(false);

    if let Err(e) = guild_id
        .ban_with_reason(ctx.http(), target.id, 0, &reason)
        .await
    {
        tracing::warn!(target_id = target.id.get(), "Ban failed: {}", e);
        return reply_ephemeral(
            ctx,
            "I cannot ban this user. They may have higher permissions than me.",
        )
        .await;
    }

    if record_and_notify(ctx, &target, InfractionKind::Ban, &reason, None, silent)
        .await?
    {
        confirm(ctx, &target, InfractionKind::Ban, "", silent).await?;
    }
    Ok(())
}

/// Times out a user for a specified duration
#[poise::command(slash_command, guild_only)]
pub async fn timeout(
    ctx: Context<'_>,
    #[description = "The user to timeout"] target: serenity::User,
    #[description = "Duration of the timeout in minutes"]
    #[min = 1]
    #[max = 40320]
    duration: u32,
    #[description = "Reason for timing out the user"]
    #[max_length = 1000]
    reason: String,
    #[description = "Whether to silently timeout the user"] silent: Option<bool>,
) -> Result<(), Error> {
    if !permissions::require(ctx, Clearance::Moderator).await? {
        return Ok(());
    }
    ctx.defer_ephemeral().await?;
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?;
    let silent = silent.unwrap_or(false);
    let duration = duration.clamp(1, MAX_TIMEOUT_MINUTES);

    let until = serenity::Timestamp::from_unix_timestamp(
        chrono::Utc::now().timestamp() + i64::from(duration) * 60,
    )?;

    if let Err(e) = guild_id
        .edit_member(
            ctx.serenity_context(),
            target.id,
            serenity::EditMember::new()
                .disable_communication_until_datetime(until)
                .audit_log_reason(&reason),
        )
        .await
    {
        tracing::warn!(target_id = target.id.get(), "Timeout failed: {}", e);
        return reply_ephemeral(
            ctx,
            "I cannot timeout this user. They may have higher permissions than me.",
        )
        .await;
    }

    if record_and_notify(
        ctx,
        &target,
        InfractionKind::Timeout,
        &reason,
        Some(duration),
        silent,
    )
    .await?
    {
        confirm(
            ctx,
            &target,
            InfractionKind::Timeout,
            &format!(" for {} minute(s)", duration),
            silent,
        )
        .await?;
    }
    Ok(())
}

/// Softbans a user (bans and immediately unbans to delete messages)
#[poise::command(slash_command, guild_only)]
pub async fn softban(
    ctx: Context<'_>,
    #[description = "The user to softban"] target: serenity::User,
    #[description = "Number of days of messages to delete (1-7)"]
    #[min = 1]
    #[max = 7]
    days: u8,
    #[description = "Reason for the softban"]
    #[max_length = 1000]
    reason: String,
    #[description = "Whether to silently softban the user"] silent: Option<bool>,
) -> Result<(), Error> {
    if !permissions::require(ctx, Clearance::Moderator).await? {
        return Ok(());
    }
    ctx.defer_ephemeral().await?;
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?;
    let silent = silent.unwrap_or(false);

    if let Err(e) = guild_id
        .ban_with_reason(
            ctx.http(),
            target.id,
            days.clamp(1, 7),
            format!("Softban: {}", reason),
        )
        .await
    {
        tracing::warn!(target_id = target.id.get(), "Softban failed: {}", e);
        return reply_ephemeral(
            ctx,
            "I cannot softban this user. They may have higher permissions than me.",
        )
        .await;
    }

    // The ban already landed; a failed unban must still be recorded.
    if let Err(e) = guild_id.unban(ctx.http(), target.id).await {
        tracing::error!(target_id = target.id.get(), "Softban unban step failed: {}", e);
    }

    if record_and_notify(ctx, &target, InfractionKind::Softban, &reason, None, silent)
        .await?
    {
        confirm(ctx, &target, InfractionKind::Softban, "", silent).await?;
    }
    Ok(())
}

/// Unbans a user from the server
#[poise::command(slash_command, guild_only)]
pub async fn unban(
    ctx: Context<'_>,
    #[description = "The ID of the user to unban"] userid: serenity::UserId,
    #[description = "Reason for unbanning the user"]
    #[max_length = 1000]
    reason: String,
) -> Result<(), Error> {
    if !permissions::require(ctx, Clearance::Moderator).await? {
        return Ok(());
    }
    ctx.defer_ephemeral().await?;
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?;

    if let Err(e) = guild_id.unban(ctx.http(), userid).await {
        tracing::warn!(target_id = userid.get(), "Unban failed: {}", e);
        return reply_ephemeral(ctx, "There was an error trying to unban the user.").await;
    }

    let target = userid.to_user(ctx.serenity_context()).await?;
    // Unbanned users are no longer in the server; nothing to DM.
    if record_and_notify(ctx, &target, InfractionKind::Unban, &reason, None, true)
        .await?
    {
        confirm(ctx, &target, InfractionKind::Unban, "", false).await?;
    }
    Ok(())
}

/// View moderation history of a user
#[poise::command(slash_command, guild_only, rename = "viewmoderation")]
pub async fn view_moderation(
    ctx: Context<'_>,
    #[description = "The user to check"] target: serenity::User,
) -> Result<(), Error> {
    if !permissions::require(ctx, Clearance::Moderator).await? {
        return Ok(());
    }
    ctx.defer_ephemeral().await?;

    let history: Vec<Infraction> = ctx
        .data()
        .infractions
        .list_by_user(&target.id.to_string())
        .await
        .into_iter()
        .filter(|inf| inf.kind.is_moderation_action())
        .collect();

    if history.is_empty() {
        return reply_ephemeral(ctx, format!("{} has no moderation history.", target.tag())).await;
    }

    let mut embed = serenity::CreateEmbed::new()
        .title("Moderation History")
        .description(format!("Showing moderation history for {}", target.tag()))
        .color(serenity::Color::BLUE)
        .thumbnail(target.face())
        .field(
            "User Information",
            format!(
                "**Username:** {}\n**ID:** {}\n**Total Infractions:** {}",
                target.tag(),
                target.id,
                history.len()
            ),
            false,
        )
        .footer(serenity::CreateEmbedFooter::new("Moderation History"))
        .timestamp(serenity::Timestamp::now());

    let skipped = history.len().saturating_sub(MAX_LISTED);
    for (index, inf) in history.iter().enumerate().skip(skipped) {
        let mut lines = vec![
            format!("**Moderator:** <@{}>", inf.issuer_id),
            format!("**Reason:** {}", inf.reason),
            format!("**Date:** {}", discord_timestamp(inf.created_at, 'F')),
        ];
        if let Some(minutes) = inf.duration_minutes {
            lines.push(format!("**Duration:** {} minute(s)", minutes));
        }

        embed = embed.field(
            format!("{} #{} (case {})", kind_heading(inf.kind), index + 1, inf.id),
            field_text(&lines.join("\n")),
            false,
        );
    }

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}
