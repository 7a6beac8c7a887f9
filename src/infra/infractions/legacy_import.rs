// Readers for the two JSON ledgers the bot used before they were merged.
//
// - Staff infractions: a flat array of records with `date`/`expiration`.
// - Moderation log: a map of user id -> list of WARN/KICK/BAN/... entries.
//
// Both are turned into drafts for `InfractionService::import`, which assigns
// fresh ids. Entries that can't be understood are skipped with a warning.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::fs;

use crate::core::infractions::{InfractionDraft, InfractionError, InfractionKind};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyStaffRecord {
    user_id: String,
    #[serde(default)]
    issuer_id: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    reason: String,
    #[serde(default)]
    notes: Option<String>,
    #[serde(alias = "createdAt")]
    date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct LegacyModerationEntry {
    #[serde(rename = "type")]
    kind: String,
    reason: String,
    #[serde(default)]
    moderator: Option<String>,
    date: DateTime<Utc>,
    #[serde(default)]
    duration: Option<u32>,
}

fn parse_error(context: &str, err: impl std::fmt::Display) -> InfractionError {
    InfractionError::StorageError(format!("{}: {}", context, err))
}

/// Legacy notes used the literal string "None" for "no notes".
fn clean_notes(notes: Option<String>) -> String {
    match notes {
        Some(n) if n.trim() != "None" => n.trim().to_string(),
        _ => String::new(),
    }
}

/// Parse the old staff-infraction array.
///
/// Expiry is recomputed from the issue date with the current windows; the
/// old files stored it inconsistently (seconds from "now", or not at all).
pub fn parse_staff_records(text: &str) -> Result<Vec<InfractionDraft>, InfractionError> {
    let records: Vec<LegacyStaffRecord> =
        serde_json::from_str(text).map_err(|e| parse_error("parsing legacy infractions", e))?;

    let mut drafts = Vec::with_capacity(records.len());
    for record in records {
        let kind = match record.kind.parse::<InfractionKind>() {
            Ok(kind) => kind,
            Err(e) => {
                tracing::warn!(user_id = %record.user_id, "Skipping legacy infraction: {}", e);
                continue;
            }
        };

        if record.user_id.trim().is_empty() || record.reason.trim().is_empty() {
            tracing::warn!(user_id = %record.user_id, "Skipping legacy infraction with no user or reason");
            continue;
        }

        drafts.push(InfractionDraft {
            user_id: record.user_id,
            issuer_id: record.issuer_id.unwrap_or_else(|| "unknown".to_string()),
            kind,
            reason: record.reason,
            notes: clean_notes(record.notes),
            created_at: record.date,
            expires_at: kind.expiry_from(record.date),
            duration_minutes: None,
        });
    }

    Ok(drafts)
}

/// Parse the old per-user moderation log. Results are ordered by date.
pub fn parse_moderation_log(text: &str) -> Result<Vec<InfractionDraft>, InfractionError> {
    let log: BTreeMap<String, Vec<LegacyModerationEntry>> =
        serde_json::from_str(text).map_err(|e| parse_error("parsing legacy moderation log", e))?;

    let mut drafts = Vec::new();
    for (user_id, entries) in log {
        for entry in entries {
            let kind = match entry.kind.parse::<InfractionKind>() {
                Ok(kind) if kind.is_moderation_action() => kind,
                _ => {
                    tracing::warn!(user_id = %user_id, kind = %entry.kind, "Skipping legacy moderation entry");
                    continue;
                }
            };

            if user_id.trim().is_empty() || entry.reason.trim().is_empty() {
                tracing::warn!(user_id = %user_id, kind = %entry.kind, "Skipping legacy moderation entry with no user or reason");
                continue;
            }

            drafts.push(InfractionDraft {
                user_id: user_id.clone(),
                issuer_id: entry.moderator.unwrap_or_else(|| "unknown".to_string()),
                kind,
                reason: entry.reason,
                notes: String::new(),
                created_at: entry.date,
                expires_at: None,
                duration_minutes: entry.duration.filter(|_| kind == InfractionKind::Timeout),
            });
        }
    }

    drafts.sort_by_key(|d| d.created_at);
    Ok(drafts)
}

async fn read_legacy(path: &Path) -> Result<Option<String>, InfractionError> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "Legacy file not found, nothing to import");
        return Ok(None);
    }
    fs::read_to_string(path)
        .await
        .map(Some)
        .map_err(|e| parse_error("reading legacy file", e))
}

/// Read both legacy files (either may be absent) into one date-ordered list.
pub async fn read_legacy_files(
    staff_path: Option<&Path>,
    moderation_path: Option<&Path>,
) -> Result<Vec<InfractionDraft>, InfractionError> {
    let mut drafts = Vec::new();

    if let Some(path) = staff_path {
        if let Some(text) = read_legacy(path).await? {
            drafts.extend(parse_staff_records(&text)?);
        }
    }
    if let Some(path) = moderation_path {
        if let Some(text) = read_legacy(path).await? {
            drafts.extend(parse_moderation_log(&text)?);
        }
    }

    drafts.sort_by_key(|d| d.created_at);
    Ok(drafts)
}
