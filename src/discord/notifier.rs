// Best-effort delivery of ledger changes: DM the target, post to a log channel.
//
// Nothing in here can fail a command. By the time we get called the ledger has
// already committed; a closed DM or a missing channel only gets a warning.

use crate::config::Settings;
use crate::core::infractions::{Infraction, InfractionKind};
use chrono::{DateTime, Utc};
use poise::serenity_prelude::{self as serenity, CreateEmbed, CreateEmbedFooter, CreateMessage};
use std::sync::Arc;

const EMBED_COLOR: u32 = 0x2d2d31;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerChange {
    Issued,
    Updated,
    Removed,
}

impl LedgerChange {
    fn title(self) -> &'static str {
        match self {
            LedgerChange::Issued => "Staff Punishment",
            LedgerChange::Updated => "Staff Infraction Update",
            LedgerChange::Removed => "Staff Infraction Removal",
        }
    }
}

/// `<t:...:F>` style timestamp that Discord renders in the reader's timezone.
pub fn discord_timestamp(at: DateTime<Utc>, style: char) -> String {
    format!("<t:{}:{}>", at.timestamp(), style)
}

/// Discord rejects embed field values over this many characters.
const FIELD_LIMIT: usize = 1024;

/// Cut `text` down to what fits in an embed field.
pub fn field_text(text: &str) -> String {
    if text.chars().count() <= FIELD_LIMIT {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(FIELD_LIMIT - 3).collect();
    cut.push_str("...");
    cut
}

pub fn notes_or_none(notes: &str) -> &str {
    if notes.is_empty() {
        "None"
    } else {
        notes
    }
}

/// Past-tense verb for a moderation action ("warned", "banned", ...).
pub fn action_verb(kind: InfractionKind) -> &'static str {
    match kind {
        InfractionKind::Warn => "warned",
        InfractionKind::Kick => "kicked",
        InfractionKind::Ban => "banned",
        InfractionKind::Timeout => "timed out",
        InfractionKind::Softban => "softbanned",
        InfractionKind::Unban => "unbanned",
        _ => "infracted",
    }
}

pub fn format_infraction(
    change: LedgerChange,
    infraction: &Infraction,
    issuer: &serenity::User,
) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title(change.title())
        .color(EMBED_COLOR)
        .field("Case:", format!("#{}", infraction.id), true)
        .field("Punishment:", infraction.kind.label(), true)
        .field("Date:", discord_timestamp(infraction.created_at, 'F'), true)
        .field("Reason:", field_text(&infraction.reason), false)
        .field("Notes:", field_text(notes_or_none(&infraction.notes)), false);

    if change != LedgerChange::Removed {
        let expiry = infraction
            .expires_at
            .map(|at| discord_timestamp(at, 'R'))
            .unwrap_or_else(|| "Never".to_string());
        embed = embed.field("Expiration:", expiry, false);
    }

    embed.footer(
        CreateEmbedFooter::new(format!("Issued by: {}", issuer.tag())).icon_url(issuer.face()),
    )
}

pub fn format_moderation_log(
    infraction: &Infraction,
    target: &serenity::User,
    issuer: &serenity::User,
) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title(format!(
            "User {} by {}",
            capitalize(action_verb(infraction.kind)),
            issuer.tag()
        ))
        .color(EMBED_COLOR)
        .field("User", format!("{} ({})", target.tag(), target.id), true)
        .field("Moderator", issuer.tag(), true);

    if let Some(minutes) = infraction.duration_minutes {
        embed = embed.field("Duration", format!("{} minute(s)", minutes), true);
    }

    embed
        .field("Reason", field_text(&infraction.reason), false)
        .field("Case", format!("#{}", infraction.id), true)
        .field("Date", discord_timestamp(infraction.created_at, 'F'), true)
        .footer(CreateEmbedFooter::new("Moderation"))
        .timestamp(serenity::Timestamp::now())
}

pub fn format_moderation_dm(infraction: &Infraction, guild_name: &str) -> CreateEmbed {
    let verb = action_verb(infraction.kind);
    let preposition = match infraction.kind {
        InfractionKind::Kick | InfractionKind::Ban | InfractionKind::Softban => "from",
        _ => "in",
    };

    let mut embed = CreateEmbed::new()
        .title(format!("You have been {}", verb))
        .description(format!("You have been {} {} {}", verb, preposition, guild_name))
        .color(EMBED_COLOR)
        .field("Reason", field_text(&infraction.reason), false);

    if let Some(minutes) = infraction.duration_minutes {
        embed = embed.field("Duration", format!("{} minute(s)", minutes), false);
    }

    embed.timestamp(serenity::Timestamp::now())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub struct Notifier {
    http: Arc<serenity::Http>,
    settings: Arc<Settings>,
    guild_id: Option<u64>,
}

impl Notifier {
    pub fn new(http: Arc<serenity::Http>, settings: Arc<Settings>, guild_id: Option<u64>) -> Self {
        Self {
            http,
            settings,
            guild_id,
        }
    }

    fn appeal_row(&self) -> Vec<serenity::CreateActionRow> {
        match (self.guild_id, self.settings.appeal_channel_id) {
            (Some(guild), Some(channel)) => vec![serenity::CreateActionRow::Buttons(vec![
                serenity::CreateButton::new_link(format!(
                    "https://discord.com/channels/{}/{}",
                    guild, channel
                ))
                .label("Appeal Infraction"),
            ])],
            _ => Vec::new(),
        }
    }

    /// Tell the infracted member and the infraction channel about a change.
    pub async fn infraction_changed(
        &self,
        change: LedgerChange,
        infraction: &Infraction,
        issuer: &serenity::User,
    ) {
        let embed = format_infraction(change, infraction, issuer);
        let components = if change == LedgerChange::Removed {
            Vec::new()
        } else {
            self.appeal_row()
        };

        self.dm(
            &infraction.user_id,
            CreateMessage::new()
                .embed(embed.clone())
                .components(components.clone()),
        )
        .await;
        self.post(
            self.settings.infraction_channel_id,
            CreateMessage::new().embed(embed).components(components),
        )
        .await;
    }

    /// Log a warn/kick/ban/... and, unless silent, DM the target.
    pub async fn moderation_action(
        &self,
        infraction: &Infraction,
        target: &serenity::User,
        issuer: &serenity::User,
        guild_name: &str,
        notify_target: bool,
    ) {
        self.post(
            self.settings.mod_log_channel_id,
            CreateMessage::new().embed(format_moderation_log(infraction, target, issuer)),
        )
        .await;

        if notify_target {
            self.dm(
                &infraction.user_id,
                CreateMessage::new().embed(format_moderation_dm(infraction, guild_name)),
            )
            .await;
        }
    }

    async fn dm(&self, user_id: &str, message: CreateMessage) {
        let Ok(raw_id) = user_id.parse::<u64>() else {
            tracing::warn!(user_id, "Not a Discord user id, skipping DM");
            return;
        };

        let user = serenity::UserId::new(raw_id);
        let result = match user.create_dm_channel(&self.http).await {
            Ok(channel) => channel.send_message(&self.http, message).await.map(|_| ()),
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            tracing::warn!(user_id, "Could not send DM: {}", e);
        }
    }

    async fn post(&self, channel_id: Option<u64>, message: CreateMessage) {
        let Some(channel_id) = channel_id else {
            tracing::debug!("No log channel configured, skipping post");
            return;
        };

        if let Err(e) = serenity::ChannelId::new(channel_id)
            .send_message(&self.http, message)
            .await
        {
            tracing::warn!(channel_id, "Failed to post to log channel: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discord_timestamp() {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(discord_timestamp(at, 'R'), "<t:1700000000:R>");
    }

    #[test]
    fn test_long_text_fits_in_a_field() {
        assert_eq!(field_text("short"), "short");

        let exact = "x".repeat(FIELD_LIMIT);
        assert_eq!(field_text(&exact), exact);

        let long = "é".repeat(FIELD_LIMIT + 500);
        let cut = field_text(&long);
        assert_eq!(cut.chars().count(), FIELD_LIMIT);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn test_action_wording() {
        assert_eq!(action_verb(InfractionKind::Timeout), "timed out");
        assert_eq!(capitalize(action_verb(InfractionKind::Softban)), "Softbanned");
        assert_eq!(notes_or_none(""), "None");
        assert_eq!(notes_or_none("keep an eye out"), "keep an eye out");
    }
}
