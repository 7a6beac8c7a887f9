// Role gates for the moderation commands.
//
// The ledger itself trusts its callers; these checks are the only thing
// standing between a member and `/infraction issue`.

use crate::config::Settings;
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

/// Who may run a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clearance {
    /// Staff role (infraction commands).
    Staff,
    /// Moderator or admin role (warn/kick/ban/...).
    Moderator,
}

impl Clearance {
    fn roles(self, settings: &Settings) -> Vec<Option<u64>> {
        match self {
            Clearance::Staff => vec![settings.staff_role_id],
            Clearance::Moderator => vec![settings.moderator_role_id, settings.admin_role_id],
        }
    }

    fn denial(self) -> &'static str {
        match self {
            Clearance::Staff => "You do not have permission to use this command.",
            Clearance::Moderator => "You need Moderator permissions to use this command.",
        }
    }
}

/// True if any configured role id appears in `member_roles`.
/// Unconfigured roles never match.
pub fn holds_any_role(member_roles: &[u64], allowed: &[Option<u64>]) -> bool {
    allowed
        .iter()
        .flatten()
        .any(|role| member_roles.contains(role))
}

/// Server administrators pass every gate.
pub fn member_has_clearance(
    member: &serenity::Member,
    settings: &Settings,
    clearance: Clearance,
) -> bool {
    let is_admin = member
        .permissions
        .map(|p| p.administrator())
        .unwrap_or(false);
    if is_admin {
        return true;
    }

    let roles: Vec<u64> = member.roles.iter().map(|r| r.get()).collect();
    holds_any_role(&roles, &clearance.roles(settings))
}

pub async fn has_clearance(ctx: Context<'_>, clearance: Clearance) -> bool {
    match ctx.author_member().await {
        Some(member) => member_has_clearance(&member, &ctx.data().settings, clearance),
        None => false,
    }
}

/// Check clearance and send the ephemeral denial if it's missing.
pub async fn require(ctx: Context<'_>, clearance: Clearance) -> Result<bool, Error> {
    if has_clearance(ctx, clearance).await {
        return Ok(true);
    }

    tracing::info!(
        user_id = ctx.author().id.get(),
        command = %ctx.command().qualified_name,
        ?clearance,
        "Command refused: missing clearance"
    );
    ctx.send(
        poise::CreateReply::default()
            .content(clearance.denial())
            .ephemeral(true),
    )
    .await?;
    Ok(false)
}
