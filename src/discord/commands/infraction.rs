// Discord commands for the staff infraction ledger.
//
// Same pattern as every other command file:
// 1. Check the caller's clearance
// 2. Call the core service
// 3. Notify and reply based on the result

use crate::core::infractions::{Infraction, InfractionError, InfractionKind};
use crate::discord::notifier::{
    discord_timestamp, field_text, format_infraction, notes_or_none, LedgerChange, Notifier,
};
use crate::discord::permissions::{self, Clearance};
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Discord embeds cap out at 25 fields; one goes to the summary.
const MAX_LISTED: usize = 24;

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum InfractionTypeChoice {
    #[name = "Inactivity Notice"]
    InactivityNotice,
    Notice,
    Warning,
    Strike,
    #[name = "Under Investigation"]
    UnderInvestigation,
    Suspended,
    Demotion,
    Terminated,
    Blacklisted,
}

impl From<InfractionTypeChoice> for InfractionKind {
    fn from(value: InfractionTypeChoice) -> Self {
        match value {
            InfractionTypeChoice::InactivityNotice => InfractionKind::InactivityNotice,
            InfractionTypeChoice::Notice => InfractionKind::Notice,
            InfractionTypeChoice::Warning => InfractionKind::Warning,
            InfractionTypeChoice::Strike => InfractionKind::Strike,
            InfractionTypeChoice::UnderInvestigation => InfractionKind::UnderInvestigation,
            InfractionTypeChoice::Suspended => InfractionKind::Suspended,
            InfractionTypeChoice::Demotion => InfractionKind::Demotion,
            InfractionTypeChoice::Terminated => InfractionKind::Terminated,
            InfractionTypeChoice::Blacklisted => InfractionKind::Blacklisted,
        }
    }
}

/// Turn the errors a caller can fix into a reply; pass storage failures on.
pub(crate) async fn reply_or_raise(ctx: Context<'_>, err: InfractionError) -> Result<(), Error> {
    let message = match err {
        InfractionError::NotFound(id) => format!("Infraction ID {} not found.", id),
        InfractionError::Validation(reason) => format!("That doesn't look right: {}.", reason),
        storage @ InfractionError::StorageError(_) => return Err(storage.into()),
    };
    ctx.send(poise::CreateReply::default().content(message).ephemeral(true))
        .await?;
    Ok(())
}

/// `/infraction` only deals in staff records; moderation-log ids look missing.
fn staff_record(found: Option<Infraction>, id: u64) -> Result<Infraction, InfractionError> {
    found
        .filter(|inf| !inf.kind.is_moderation_action())
        .ok_or(InfractionError::NotFound(id))
}

pub(crate) fn notifier(ctx: Context<'_>) -> Notifier {
    Notifier::new(
        Arc::clone(&ctx.serenity_context().http),
        Arc::clone(&ctx.data().settings),
        ctx.guild_id().map(|g| g.get()),
    )
}

/// Infraction commands
#[poise::command(
    slash_command,
    guild_only,
    subcommands("view", "case", "issue", "edit", "delete")
)]
pub async fn infraction(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// View a user's infractions
#[poise::command(slash_command, guild_only)]
pub async fn view(
    ctx: Context<'_>,
    #[description = "The user whose infractions you want to view"] user: serenity::User,
) -> Result<(), Error> {
    if !permissions::require(ctx, Clearance::Staff).await? {
        return Ok(());
    }

    let records: Vec<Infraction> = ctx
        .data()
        .infractions
        .list_by_user(&user.id.to_string())
        .await
        .into_iter()
        .filter(|inf| !inf.kind.is_moderation_action())
        .collect();

    if records.is_empty() {
        ctx.send(
            poise::CreateReply::default()
                .content(format!("{} has no infractions.", user.tag()))
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    let mut embed = serenity::CreateEmbed::new()
        .title("Infractions")
        .description(format!("Staff Member: {}", user.tag()))
        .color(0x2d2d31)
        .thumbnail(user.face())
        .field("Infractions:", records.len().to_string(), false);

    for inf in records.iter().rev().take(MAX_LISTED).rev() {
        let expiry = inf
            .expires_at
            .map(|at| discord_timestamp(at, 'R'))
            .unwrap_or_else(|| "Never".to_string());
        embed = embed.field(
            format!("Infraction - ID# {}", inf.id),
            field_text(&format!(
                "**Issued by:** <@{}>\n**Reason:** {}\n**Punishment:** {}\n**Notes:** {}\n**Date:** {}\n**Expires:** {}",
                inf.issuer_id,
                inf.reason,
                inf.kind,
                notes_or_none(&inf.notes),
                discord_timestamp(inf.created_at, 'F'),
                expiry
            )),
            false,
        );
    }

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Look up a single infraction by ID
#[poise::command(slash_command, guild_only)]
pub async fn case(
    ctx: Context<'_>,
    #[description = "The infraction ID"] id: u64,
) -> Result<(), Error> {
    if !permissions::require(ctx, Clearance::Staff).await? {
        return Ok(());
    }

    let infraction = match staff_record(ctx.data().infractions.get(id).await, id) {
        Ok(inf) => inf,
        Err(e) => return reply_or_raise(ctx, e).await,
    };

    let embed = format_infraction(LedgerChange::Issued, &infraction, ctx.author())
        .description(format!("Issued to <@{}> by <@{}>", infraction.user_id, infraction.issuer_id));
    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Add an infraction to a user
#[poise::command(slash_command, guild_only)]
pub async fn issue(
    ctx: Context<'_>,
    #[description = "The user to infraction"] user: serenity::User,
    #[description = "The reason for the infraction"]
    #[max_length = 1000]
    reason: String,
    #[description = "The type of infraction"]
    #[rename = "type"]
    kind: InfractionTypeChoice,
    #[description = "Additional notes"]
    #[max_length = 1000]
    notes: Option<String>,
) -> Result<(), Error> {
    if !permissions::require(ctx, Clearance::Staff).await? {
        return Ok(());
    }
    ctx.defer_ephemeral().await?;

    let result = ctx
        .data()
        .infractions
        .issue(
            &user.id.to_string(),
            &ctx.author().id.to_string(),
            kind.into(),
            &reason,
            notes.as_deref(),
        )
        .await;
    let infraction = match result {
        Ok(inf) => inf,
        Err(e) => return reply_or_raise(ctx, e).await,
    };

    notifier(ctx)
        .infraction_changed(LedgerChange::Issued, &infraction, ctx.author())
        .await;

    ctx.send(
        poise::CreateReply::default()
            .content(format!("{} has been infracted.", user.tag()))
            .embed(format_infraction(LedgerChange::Issued, &infraction, ctx.author()))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Edit an existing infraction
#[poise::command(slash_command, guild_only)]
pub async fn edit(
    ctx: Context<'_>,
    #[description = "The infraction ID"] id: u64,
    #[description = "The new reason for the infraction"]
    #[max_length = 1000]
    reason: String,
    #[description = "The new type of infraction"]
    #[rename = "type"]
    kind: InfractionTypeChoice,
    #[description = "Additional notes"]
    #[max_length = 1000]
    notes: Option<String>,
) -> Result<(), Error> {
    if !permissions::require(ctx, Clearance::Staff).await? {
        return Ok(());
    }
    ctx.defer_ephemeral().await?;

    if let Err(e) = staff_record(ctx.data().infractions.get(id).await, id) {
        return reply_or_raise(ctx, e).await;
    }

    let infraction = match ctx
        .data()
        .infractions
        .edit(id, &reason, kind.into(), notes.as_deref())
        .await
    {
        Ok(inf) => inf,
        Err(e) => return reply_or_raise(ctx, e).await,
    };

    notifier(ctx)
        .infraction_changed(LedgerChange::Updated, &infraction, ctx.author())
        .await;

    ctx.send(
        poise::CreateReply::default()
            .content(format!("Infraction ID {} has been updated.", id))
            .embed(format_infraction(LedgerChange::Updated, &infraction, ctx.author()))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Delete an infraction
#[poise::command(slash_command, guild_only)]
pub async fn delete(
    ctx: Context<'_>,
    #[description = "The infraction ID"] id: u64,
) -> Result<(), Error> {
    if !permissions::require(ctx, Clearance::Staff).await? {
        return Ok(());
    }
    ctx.defer_ephemeral().await?;

    if let Err(e) = staff_record(ctx.data().infractions.get(id).await, id) {
        return reply_or_raise(ctx, e).await;
    }

    let removed = match ctx.data().infractions.delete(id).await {
        Ok(inf) => inf,
        Err(e) => return reply_or_raise(ctx, e).await,
    };

    notifier(ctx)
        .infraction_changed(LedgerChange::Removed, &removed, ctx.author())
        .await;

    ctx.send(
        poise::CreateReply::default()
            .content(format!("Infraction ID {} has been deleted.", id))
            .embed(format_infraction(LedgerChange::Removed, &removed, ctx.author()))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: InfractionKind) -> Infraction {
        Infraction {
            id: 7,
            user_id: "U1".to_string(),
            issuer_id: "M1".to_string(),
            kind,
            reason: "reason".to_string(),
            notes: String::new(),
            created_at: chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            expires_at: None,
            duration_minutes: None,
        }
    }

    #[test]
    fn test_moderation_records_are_hidden_from_staff_commands() {
        assert!(matches!(
            staff_record(Some(record(InfractionKind::Ban)), 7),
            Err(InfractionError::NotFound(7))
        ));
        assert!(matches!(
            staff_record(None, 7),
            Err(InfractionError::NotFound(7))
        ));
        assert_eq!(
            staff_record(Some(record(InfractionKind::Strike)), 7).unwrap().kind,
            InfractionKind::Strike
        );
    }

    #[test]
    fn test_every_staff_kind_is_selectable() {
        let choices = [
            InfractionTypeChoice::InactivityNotice,
            InfractionTypeChoice::Notice,
            InfractionTypeChoice::Warning,
            InfractionTypeChoice::Strike,
            InfractionTypeChoice::UnderInvestigation,
            InfractionTypeChoice::Suspended,
            InfractionTypeChoice::Demotion,
            InfractionTypeChoice::Terminated,
            InfractionTypeChoice::Blacklisted,
        ];

        let kinds: Vec<InfractionKind> = choices.into_iter().map(InfractionKind::from).collect();
        let staff: Vec<InfractionKind> = InfractionKind::ALL
            .into_iter()
            .filter(|k| !k.is_moderation_action())
            .collect();
        assert_eq!(kinds, staff);
    }
}
