// Infraction domain models - the records kept in the moderation ledger.
//
// Pure domain types with no Discord dependencies. User and issuer ids are
// opaque strings; the Discord layer decides what goes in them.

use super::infraction_service::InfractionError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every kind of record the ledger can hold.
///
/// The first nine are staff punishments and expire after a fixed window.
/// The rest are plain moderation actions (warn/kick/ban/...) which never expire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InfractionKind {
    #[serde(rename = "Inactivity Notice")]
    InactivityNotice,
    Notice,
    Warning,
    Strike,
    #[serde(rename = "Under Investigation")]
    UnderInvestigation,
    Suspended,
    Demotion,
    Terminated,
    Blacklisted,
    #[serde(rename = "WARN")]
    Warn,
    #[serde(rename = "KICK")]
    Kick,
    #[serde(rename = "BAN")]
    Ban,
    #[serde(rename = "TIMEOUT")]
    Timeout,
    #[serde(rename = "SOFTBAN")]
    Softban,
    #[serde(rename = "UNBAN")]
    Unban,
}

impl InfractionKind {
    pub const ALL: [InfractionKind; 15] = [
        InfractionKind::InactivityNotice,
        InfractionKind::Notice,
        InfractionKind::Warning,
        InfractionKind::Strike,
        InfractionKind::UnderInvestigation,
        InfractionKind::Suspended,
        InfractionKind::Demotion,
        InfractionKind::Terminated,
        InfractionKind::Blacklisted,
        InfractionKind::Warn,
        InfractionKind::Kick,
        InfractionKind::Ban,
        InfractionKind::Timeout,
        InfractionKind::Softban,
        InfractionKind::Unban,
    ];

    /// Name used on disk and shown to users.
    pub fn label(self) -> &'static str {
        match self {
            InfractionKind::InactivityNotice => "Inactivity Notice",
            InfractionKind::Notice => "Notice",
            InfractionKind::Warning => "Warning",
            InfractionKind::Strike => "Strike",
            InfractionKind::UnderInvestigation => "Under Investigation",
            InfractionKind::Suspended => "Suspended",
            InfractionKind::Demotion => "Demotion",
            InfractionKind::Terminated => "Terminated",
            InfractionKind::Blacklisted => "Blacklisted",
            InfractionKind::Warn => "WARN",
            InfractionKind::Kick => "KICK",
            InfractionKind::Ban => "BAN",
            InfractionKind::Timeout => "TIMEOUT",
            InfractionKind::Softban => "SOFTBAN",
            InfractionKind::Unban => "UNBAN",
        }
    }

    /// Days until a record of this kind expires, or `None` if it never does.
    pub fn expiration_days(self) -> Option<i64> {
        match self {
            InfractionKind::InactivityNotice
            | InfractionKind::Notice
            | InfractionKind::Warning
            | InfractionKind::Strike => Some(14),
            InfractionKind::UnderInvestigation
            | InfractionKind::Suspended
            | InfractionKind::Demotion
            | InfractionKind::Terminated => Some(21),
            InfractionKind::Blacklisted => Some(365),
            InfractionKind::Warn
            | InfractionKind::Kick
            | InfractionKind::Ban
            | InfractionKind::Timeout
            | InfractionKind::Softban
            | InfractionKind::Unban => None,
        }
    }

    pub fn expiration_window(self) -> Option<Duration> {
        self.expiration_days().map(Duration::days)
    }

    /// Expiry for a record of this kind issued at `issued_at`.
    pub fn expiry_from(self, issued_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expiration_window().map(|window| issued_at + window)
    }

    /// True for the warn/kick/ban/timeout/softban/unban log entries.
    pub fn is_moderation_action(self) -> bool {
        self.expiration_days().is_none()
    }
}

impl fmt::Display for InfractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for InfractionKind {
    type Err = InfractionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        InfractionKind::ALL
            .into_iter()
            .find(|kind| kind.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| InfractionError::Validation(format!("unknown infraction type '{}'", s)))
    }
}

/// One record in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Infraction {
    pub id: u64,
    pub user_id: String,
    pub issuer_id: String,
    #[serde(rename = "type")]
    pub kind: InfractionKind,
    pub reason: String,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
    /// Stored rather than derived so policy changes don't rewrite old records.
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Only set on timeouts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
}

impl Infraction {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Everything needed to create a record except its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfractionDraft {
    pub user_id: String,
    pub issuer_id: String,
    pub kind: InfractionKind,
    pub reason: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<u32>,
}

impl InfractionDraft {
    fn into_infraction(self, id: u64) -> Infraction {
        Infraction {
            id,
            user_id: self.user_id,
            issuer_id: self.issuer_id,
            kind: self.kind,
            reason: self.reason,
            notes: self.notes,
            created_at: self.created_at,
            expires_at: self.expires_at,
            duration_minutes: self.duration_minutes,
        }
    }
}

/// The full persisted ledger.
///
/// `next_id` is a high-water mark: it only ever grows, so deleting the newest
/// record does not hand its id out again.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfractionLedger {
    #[serde(default)]
    pub next_id: u64,
    #[serde(default)]
    pub infractions: Vec<Infraction>,
}

impl InfractionLedger {
    fn allocate_id(&mut self) -> u64 {
        let after_max = self
            .infractions
            .iter()
            .map(|inf| inf.id)
            .max()
            .unwrap_or(0)
            + 1;
        let id = self.next_id.max(after_max);
        self.next_id = id + 1;
        id
    }

    /// Assign an id to `draft` and append it.
    pub fn push(&mut self, draft: InfractionDraft) -> &Infraction {
        let id = self.allocate_id();
        self.infractions.push(draft.into_infraction(id));
        &self.infractions[self.infractions.len() - 1]
    }

    pub fn position(&self, id: u64) -> Option<usize> {
        self.infractions.iter().position(|inf| inf.id == id)
    }

    pub fn len(&self) -> usize {
        self.infractions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infractions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn draft(user: &str) -> InfractionDraft {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        InfractionDraft {
            user_id: user.to_string(),
            issuer_id: "mod".to_string(),
            kind: InfractionKind::Warning,
            reason: "reason".to_string(),
            notes: String::new(),
            created_at: at,
            expires_at: InfractionKind::Warning.expiry_from(at),
            duration_minutes: None,
        }
    }

    #[test]
    fn test_expiration_windows() {
        assert_eq!(InfractionKind::InactivityNotice.expiration_days(), Some(14));
        assert_eq!(InfractionKind::Strike.expiration_days(), Some(14));
        assert_eq!(InfractionKind::UnderInvestigation.expiration_days(), Some(21));
        assert_eq!(InfractionKind::Terminated.expiration_days(), Some(21));
        assert_eq!(InfractionKind::Blacklisted.expiration_days(), Some(365));
        assert_eq!(InfractionKind::Ban.expiration_days(), None);
        assert!(InfractionKind::Softban.is_moderation_action());
        assert!(!InfractionKind::Demotion.is_moderation_action());
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!(
            "Under Investigation".parse::<InfractionKind>().unwrap(),
            InfractionKind::UnderInvestigation
        );
        assert_eq!("warn".parse::<InfractionKind>().unwrap(), InfractionKind::Warn);
        assert!(matches!(
            "Exiled".parse::<InfractionKind>(),
            Err(InfractionError::Validation(_))
        ));
    }

    #[test]
    fn test_kind_serializes_as_label() {
        for kind in InfractionKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.label()));
        }
    }

    #[test]
    fn test_ids_not_reused_after_removing_newest() {
        let mut ledger = InfractionLedger::default();
        assert_eq!(ledger.push(draft("a")).id, 1);
        assert_eq!(ledger.push(draft("b")).id, 2);
        ledger.infractions.pop();
        assert_eq!(ledger.push(draft("c")).id, 3);
    }

    #[test]
    fn test_ids_follow_existing_records_without_watermark() {
        // Ledgers written before the watermark existed only carry records.
        let mut ledger = InfractionLedger::default();
        ledger.push(draft("a"));
        ledger.push(draft("b"));
        ledger.next_id = 0;
        assert_eq!(ledger.push(draft("c")).id, 3);
    }

    #[test]
    fn test_on_disk_shape() {
        let mut ledger = InfractionLedger::default();
        ledger.push(draft("u1"));
        let value = serde_json::to_value(&ledger).unwrap();

        assert_eq!(value["nextId"], 2);
        let record = &value["infractions"][0];
        assert_eq!(record["userId"], "u1");
        assert_eq!(record["issuerId"], "mod");
        assert_eq!(record["type"], "Warning");
        assert_eq!(record["createdAt"], "2024-01-01T00:00:00Z");
        assert_eq!(record["expiresAt"], 1_705_276_800);
        assert!(record.get("durationMinutes").is_none());
    }
}
