// Runtime configuration, read once from the environment (and `.env`).

use anyhow::{ensure, Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Settings {
    pub discord_token: String,
    /// Guild to register commands in for instant updates. Global otherwise.
    pub guild_id: Option<u64>,
    pub data_dir: PathBuf,

    pub staff_role_id: Option<u64>,
    pub moderator_role_id: Option<u64>,
    pub admin_role_id: Option<u64>,

    /// Where infraction issue/edit/delete notices go.
    pub infraction_channel_id: Option<u64>,
    /// Where warn/kick/ban/... notices go.
    pub mod_log_channel_id: Option<u64>,
    pub appeal_channel_id: Option<u64>,
    pub request_channel_id: Option<u64>,
    pub request_ping_role_id: Option<u64>,

    pub sweep_interval_secs: u64,
    pub request_cooldown_secs: i64,
    pub request_ttl_hours: i64,

    pub legacy_infractions_file: Option<PathBuf>,
    pub legacy_moderation_file: Option<PathBuf>,
}

/// Unset and empty are both "not configured"; anything else must parse.
fn optional<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} has an invalid value: {:?}", key, value)),
        _ => Ok(None),
    }
}

fn with_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(optional(key)?.unwrap_or(default))
}

const MAX_SWEEP_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;
const MAX_REQUEST_COOLDOWN_SECS: i64 = 24 * 60 * 60;
const MAX_REQUEST_TTL_HOURS: i64 = 30 * 24;

/// Reject timing knobs that would panic or make no sense as durations.
fn check_timings(
    sweep_interval_secs: u64,
    request_cooldown_secs: i64,
    request_ttl_hours: i64,
) -> Result<()> {
    ensure!(
        (1..=MAX_SWEEP_INTERVAL_SECS).contains(&sweep_interval_secs),
        "SWEEP_INTERVAL_SECS must be between 1 and {}, got {}",
        MAX_SWEEP_INTERVAL_SECS,
        sweep_interval_secs
    );
    ensure!(
        (0..=MAX_REQUEST_COOLDOWN_SECS).contains(&request_cooldown_secs),
        "REQUEST_COOLDOWN_SECS must be between 0 and {}, got {}",
        MAX_REQUEST_COOLDOWN_SECS,
        request_cooldown_secs
    );
    ensure!(
        (1..=MAX_REQUEST_TTL_HOURS).contains(&request_ttl_hours),
        "REQUEST_TTL_HOURS must be between 1 and {}, got {}",
        MAX_REQUEST_TTL_HOURS,
        request_ttl_hours
    );
    Ok(())
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let discord_token = env::var("DISCORD_TOKEN").context(
            "Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.",
        )?;

        let sweep_interval_secs = with_default("SWEEP_INTERVAL_SECS", 3600)?;
        let request_cooldown_secs = with_default("REQUEST_COOLDOWN_SECS", 120)?;
        let request_ttl_hours = with_default("REQUEST_TTL_HOURS", 24)?;
        check_timings(sweep_interval_secs, request_cooldown_secs, request_ttl_hours)?;

        Ok(Self {
            discord_token,
            guild_id: optional("GUILD_ID")?,
            data_dir: with_default("DATA_DIR", PathBuf::from("data"))?,
            staff_role_id: optional("STAFF_ROLE_ID")?,
            moderator_role_id: optional("MODERATOR_ROLE_ID")?,
            admin_role_id: optional("ADMIN_ROLE_ID")?,
            infraction_channel_id: optional("INFRACTION_CHANNEL_ID")?,
            mod_log_channel_id: optional("MOD_LOG_CHANNEL_ID")?,
            appeal_channel_id: optional("APPEAL_CHANNEL_ID")?,
            request_channel_id: optional("REQUEST_CHANNEL_ID")?,
            request_ping_role_id: optional("REQUEST_PING_ROLE_ID")?,
            sweep_interval_secs,
            request_cooldown_secs,
            request_ttl_hours,
            legacy_infractions_file: optional("LEGACY_INFRACTIONS_FILE")?,
            legacy_moderation_file: optional("LEGACY_MODERATION_FILE")?,
        })
    }

    pub fn infractions_path(&self) -> PathBuf {
        self.data_dir.join("infractions.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_pass_timing_checks() {
        assert!(check_timings(3600, 120, 24).is_ok());
        assert!(check_timings(1, 0, 1).is_ok());
    }

    #[test]
    fn test_out_of_range_timings_are_rejected() {
        assert!(check_timings(0, 120, 24).is_err());
        assert!(check_timings(3600, -1, 24).is_err());
        assert!(check_timings(3600, i64::MAX, 24).is_err());
        assert!(check_timings(3600, 120, 0).is_err());
        assert!(check_timings(3600, 120, -5).is_err());
        assert!(check_timings(3600, 120, i64::MAX).is_err());
    }
}
