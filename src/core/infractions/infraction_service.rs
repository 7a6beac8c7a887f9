// Infraction service - the moderation ledger's business logic.
//
// This service handles:
// - Issuing, editing and deleting infractions
// - Listing a user's history
// - Sweeping expired records
//
// Every mutation works on a copy of the ledger, persists the copy, and only
// then swaps it in. A failed write leaves memory exactly as it was.
//
// NO Discord dependencies here - just pure domain logic.

use super::infraction_models::{Infraction, InfractionDraft, InfractionKind, InfractionLedger};
use crate::core::clock::Clock;
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum InfractionError {
    #[error("Invalid infraction: {0}")]
    Validation(String),

    #[error("Infraction #{0} not found")]
    NotFound(u64),

    #[error("Storage error: {0}")]
    StorageError(String),
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

/// Durable home of the ledger.
///
/// The whole ledger is read and written at once; the service owns the
/// in-memory copy and decides when to write.
#[async_trait]
pub trait InfractionStore: Send + Sync {
    /// Read the persisted ledger. A store that has never been written is empty.
    async fn load(&self) -> Result<InfractionLedger, InfractionError>;

    /// Replace the persisted ledger. Must not return until the write is durable.
    async fn save(&self, ledger: &InfractionLedger) -> Result<(), InfractionError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct InfractionService<S: InfractionStore> {
    store: S,
    clock: Arc<dyn Clock>,
    /// Writers hold the write guard across persist + commit.
    ledger: RwLock<InfractionLedger>,
}

impl<S: InfractionStore> InfractionService<S> {
    /// Load the persisted ledger and wrap it in a service.
    pub async fn load(store: S, clock: Arc<dyn Clock>) -> Result<Self, InfractionError> {
        let ledger = store.load().await?;
        tracing::info!(
            records = ledger.len(),
            next_id = ledger.next_id,
            "Infraction ledger loaded"
        );
        Ok(Self {
            store,
            clock,
            ledger: RwLock::new(ledger),
        })
    }

    fn require_text(field: &str, value: &str) -> Result<(), InfractionError> {
        if value.trim().is_empty() {
            Err(InfractionError::Validation(format!("{} must not be empty", field)))
        } else {
            Ok(())
        }
    }

    /// Run `mutate` against a working copy, persist it, then commit.
    async fn apply<T>(
        &self,
        mutate: impl FnOnce(&mut InfractionLedger) -> Result<T, InfractionError>,
    ) -> Result<T, InfractionError> {
        let mut ledger = self.ledger.write().await;
        let mut working = ledger.clone();
        let out = mutate(&mut working)?;
        self.store.save(&working).await?;
        *ledger = working;
        Ok(out)
    }

    /// Record a new infraction against `user_id`.
    ///
    /// The expiry is fixed at issue time from the kind's window.
    pub async fn issue(
        &self,
        user_id: &str,
        issuer_id: &str,
        kind: InfractionKind,
        reason: &str,
        notes: Option<&str>,
    ) -> Result<Infraction, InfractionError> {
        self.insert(user_id, issuer_id, kind, reason, notes, None)
            .await
    }

    /// Log a warn/kick/ban/timeout/softban/unban. These never expire.
    pub async fn record_action(
        &self,
        user_id: &str,
        issuer_id: &str,
        kind: InfractionKind,
        reason: &str,
        duration_minutes: Option<u32>,
    ) -> Result<Infraction, InfractionError> {
        if !kind.is_moderation_action() {
            return Err(InfractionError::Validation(format!(
                "'{}' is not a moderation action",
                kind
            )));
        }
        self.insert(user_id, issuer_id, kind, reason, None, duration_minutes)
            .await
    }

    async fn insert(
        &self,
        user_id: &str,
        issuer_id: &str,
        kind: InfractionKind,
        reason: &str,
        notes: Option<&str>,
        duration_minutes: Option<u32>,
    ) -> Result<Infraction, InfractionError> {
        Self::require_text("user id", user_id)?;
        Self::require_text("issuer id", issuer_id)?;
        Self::require_text("reason", reason)?;

        // Whole seconds, so the unix-second expiry on disk reloads exactly.
        let now = self.clock.now().trunc_subsecs(0);
        let draft = InfractionDraft {
            user_id: user_id.to_string(),
            issuer_id: issuer_id.to_string(),
            kind,
            reason: reason.trim().to_string(),
            notes: notes.unwrap_or_default().trim().to_string(),
            created_at: now,
            expires_at: kind.expiry_from(now),
            duration_minutes,
        };

        let infraction = self.apply(|ledger| Ok(ledger.push(draft).clone())).await?;

        tracing::info!(
            infraction_id = infraction.id,
            user_id = %infraction.user_id,
            issuer_id = %infraction.issuer_id,
            kind = %infraction.kind,
            "Infraction issued"
        );
        Ok(infraction)
    }

    /// Replace reason, kind and notes of an existing infraction.
    ///
    /// The expiry is recomputed from the original `created_at` using the new
    /// kind's window, not from the time of the edit. Staff records and
    /// moderation actions can't be edited into each other.
    pub async fn edit(
        &self,
        id: u64,
        reason: &str,
        kind: InfractionKind,
        notes: Option<&str>,
    ) -> Result<Infraction, InfractionError> {
        Self::require_text("reason", reason)?;

        let infraction = self
            .apply(|ledger| {
                let index = ledger.position(id).ok_or(InfractionError::NotFound(id))?;
                let record = &mut ledger.infractions[index];
                if record.kind.is_moderation_action() != kind.is_moderation_action() {
                    return Err(InfractionError::Validation(format!(
                        "cannot change a {} record into {}",
                        record.kind, kind
                    )));
                }
                record.reason = reason.trim().to_string();
                record.kind = kind;
                record.notes = notes.unwrap_or_default().trim().to_string();
                record.expires_at = kind.expiry_from(record.created_at);
                if kind != InfractionKind::Timeout {
                    record.duration_minutes = None;
                }
                Ok(record.clone())
            })
            .await?;

        tracing::info!(
            infraction_id = id,
            user_id = %infraction.user_id,
            kind = %infraction.kind,
            "Infraction edited"
        );
        Ok(infraction)
    }

    /// Remove an infraction for good. Returns the removed record.
    pub async fn delete(&self, id: u64) -> Result<Infraction, InfractionError> {
        let removed = self
            .apply(|ledger| {
                let index = ledger.position(id).ok_or(InfractionError::NotFound(id))?;
                Ok(ledger.infractions.remove(index))
            })
            .await?;

        tracing::info!(
            infraction_id = id,
            user_id = %removed.user_id,
            "Infraction deleted"
        );
        Ok(removed)
    }

    pub async fn get(&self, id: u64) -> Option<Infraction> {
        let ledger = self.ledger.read().await;
        ledger.infractions.iter().find(|inf| inf.id == id).cloned()
    }

    /// All of a user's infractions in the order they were issued.
    pub async fn list_by_user(&self, user_id: &str) -> Vec<Infraction> {
        let ledger = self.ledger.read().await;
        ledger
            .infractions
            .iter()
            .filter(|inf| inf.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Drop every record whose expiry is at or before `now`.
    ///
    /// Writes to the store only when something was removed.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, InfractionError> {
        let mut ledger = self.ledger.write().await;
        let before = ledger.len();
        let mut working = ledger.clone();
        working.infractions.retain(|inf| !inf.is_expired(now));

        let removed = before - working.len();
        if removed == 0 {
            return Ok(0);
        }

        self.store.save(&working).await?;
        *ledger = working;

        tracing::info!(removed, remaining = ledger.len(), "Expired infractions swept");
        Ok(removed)
    }

    /// Sweep using the service's own clock.
    pub async fn sweep_expired_now(&self) -> Result<usize, InfractionError> {
        let now = self.clock.now();
        self.sweep_expired(now).await
    }

    /// Append already-dated records (e.g. from a legacy file), assigning fresh ids.
    pub async fn import(&self, drafts: Vec<InfractionDraft>) -> Result<usize, InfractionError> {
        if drafts.is_empty() {
            return Ok(0);
        }

        for draft in &drafts {
            Self::require_text("user id", &draft.user_id)?;
            Self::require_text("reason", &draft.reason)?;
            if draft.expires_at.is_some_and(|at| at <= draft.created_at) {
                return Err(InfractionError::Validation(format!(
                    "record for {} expires before it was issued",
                    draft.user_id
                )));
            }
        }

        let count = drafts.len();
        self.apply(|ledger| {
            for draft in drafts {
                ledger.push(draft);
            }
            Ok(())
        })
        .await?;

        tracing::info!(imported = count, "Infractions imported");
        Ok(count)
    }

    pub async fn is_empty(&self) -> bool {
        self.ledger.read().await.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory store for testing. Can be told to fail writes.
    #[derive(Default)]
    struct MockInfractionStore {
        saved: Mutex<Option<InfractionLedger>>,
        fail_writes: AtomicBool,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl InfractionStore for Arc<MockInfractionStore> {
        async fn load(&self) -> Result<InfractionLedger, InfractionError> {
            Ok(self.saved.lock().unwrap().clone().unwrap_or_default())
        }

        async fn save(&self, ledger: &InfractionLedger) -> Result<(), InfractionError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(InfractionError::StorageError("disk on fire".to_string()));
            }
            self.writes.fetch_add(1, Ordering::SeqCst);
            *self.saved.lock().unwrap() = Some(ledger.clone());
            Ok(())
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    async fn setup() -> (
        InfractionService<Arc<MockInfractionStore>>,
        Arc<MockInfractionStore>,
        Arc<ManualClock>,
    ) {
        let store = Arc::new(MockInfractionStore::default());
        let clock = Arc::new(ManualClock::new(t0()));
        let service = InfractionService::load(Arc::clone(&store), clock.clone())
            .await
            .unwrap();
        (service, store, clock)
    }

    #[tokio::test]
    async fn test_issue_assigns_increasing_ids() {
        let (service, _, _) = setup().await;

        let mut last = 0;
        for i in 0..5 {
            let inf = service
                .issue(&format!("user{}", i % 2), "mod", InfractionKind::Notice, "late", None)
                .await
                .unwrap();
            assert!(inf.id > last);
            last = inf.id;
        }
        assert_eq!(last, 5);
    }

    #[tokio::test]
    async fn test_issue_then_list() {
        let (service, store, _) = setup().await;

        let inf = service
            .issue("U1", "M1", InfractionKind::Strike, "No-show", Some("second time"))
            .await
            .unwrap();

        let listed = service.list_by_user("U1").await;
        assert_eq!(listed, vec![inf.clone()]);
        assert_eq!(inf.user_id, "U1");
        assert_eq!(inf.issuer_id, "M1");
        assert_eq!(inf.reason, "No-show");
        assert_eq!(inf.notes, "second time");
        assert_eq!(inf.created_at, t0());
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_list_unknown_user_is_empty() {
        let (service, _, _) = setup().await;
        assert!(service.list_by_user("nobody").await.is_empty());
    }

    #[tokio::test]
    async fn test_issue_rejects_blank_reason() {
        let (service, store, _) = setup().await;

        let err = service
            .issue("U1", "M1", InfractionKind::Warning, "   ", None)
            .await
            .unwrap_err();

        assert!(matches!(err, InfractionError::Validation(_)));
        assert!(service.list_by_user("U1").await.is_empty());
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_warning_lifecycle() {
        let (service, _, clock) = setup().await;

        let warning = service
            .issue("U1", "M1", InfractionKind::Warning, "Disrespect", None)
            .await
            .unwrap();
        assert_eq!(warning.expires_at, Some(t0() + Duration::days(14)));

        // Edit a week later; expiry still counts from issuance
        clock.advance(Duration::days(7));
        let edited = service
            .edit(warning.id, "Repeated disrespect", InfractionKind::Blacklisted, None)
            .await
            .unwrap();
        assert_eq!(edited.created_at, t0());
        assert_eq!(edited.expires_at, Some(t0() + Duration::days(365)));
        assert_eq!(edited.reason, "Repeated disrespect");

        service.delete(warning.id).await.unwrap();
        assert!(service.list_by_user("U1").await.is_empty());
    }

    #[tokio::test]
    async fn test_edit_cannot_turn_ban_into_expiring_kind() {
        let (service, store, clock) = setup().await;
        let ban = service
            .record_action("U1", "MOD", InfractionKind::Ban, "Raiding", None)
            .await
            .unwrap();
        let writes = store.writes.load(Ordering::SeqCst);

        clock.advance(Duration::days(60));
        let err = service
            .edit(ban.id, "x", InfractionKind::Strike, None)
            .await
            .unwrap_err();
        assert!(matches!(err, InfractionError::Validation(_)));
        assert_eq!(store.writes.load(Ordering::SeqCst), writes);

        assert_eq!(service.sweep_expired_now().await.unwrap(), 0);
        assert_eq!(service.list_by_user("U1").await, vec![ban]);
    }

    #[tokio::test]
    async fn test_edit_cannot_turn_staff_record_into_action() {
        let (service, _, _) = setup().await;
        let strike = service
            .issue("U1", "M1", InfractionKind::Strike, "Late", None)
            .await
            .unwrap();

        assert!(matches!(
            service.edit(strike.id, "Late", InfractionKind::Kick, None).await,
            Err(InfractionError::Validation(_))
        ));

        // Moving within the staff kinds is still fine
        let edited = service
            .edit(strike.id, "Late", InfractionKind::Suspended, None)
            .await
            .unwrap();
        assert_eq!(edited.kind, InfractionKind::Suspended);
    }

    #[tokio::test]
    async fn test_edit_missing_id_leaves_store_unchanged() {
        let (service, store, _) = setup().await;
        let inf = service
            .issue("U1", "M1", InfractionKind::Notice, "Reason", None)
            .await
            .unwrap();

        let err = service
            .edit(99, "Other", InfractionKind::Strike, None)
            .await
            .unwrap_err();

        assert!(matches!(err, InfractionError::NotFound(99)));
        assert_eq!(service.list_by_user("U1").await, vec![inf]);
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_delete_twice_is_not_found() {
        let (service, _, _) = setup().await;
        let inf = service
            .issue("U1", "M1", InfractionKind::Suspended, "Reason", None)
            .await
            .unwrap();

        let removed = service.delete(inf.id).await.unwrap();
        assert_eq!(removed, inf);
        assert!(matches!(
            service.delete(inf.id).await,
            Err(InfractionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_deleted_id_is_never_reused() {
        let (service, _, _) = setup().await;
        let first = service
            .issue("U1", "M1", InfractionKind::Notice, "a", None)
            .await
            .unwrap();
        service.delete(first.id).await.unwrap();

        let second = service
            .issue("U1", "M1", InfractionKind::Notice, "b", None)
            .await
            .unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let (service, store, clock) = setup().await;

        let notice = service
            .issue("U1", "M1", InfractionKind::Notice, "14 days", None)
            .await
            .unwrap();
        let suspended = service
            .issue("U1", "M1", InfractionKind::Suspended, "21 days", None)
            .await
            .unwrap();
        let ban = service
            .record_action("U1", "M1", InfractionKind::Ban, "forever", None)
            .await
            .unwrap();

        // Exactly at the notice's expiry: it goes, the rest stay
        let cutoff = notice.expires_at.unwrap();
        assert_eq!(service.sweep_expired(cutoff).await.unwrap(), 1);
        assert_eq!(
            service.list_by_user("U1").await,
            vec![suspended.clone(), ban.clone()]
        );

        let writes = store.writes.load(Ordering::SeqCst);
        assert_eq!(service.sweep_expired(cutoff).await.unwrap(), 0);
        assert_eq!(store.writes.load(Ordering::SeqCst), writes);

        clock.advance(Duration::days(1000));
        assert_eq!(service.sweep_expired_now().await.unwrap(), 1);
        assert_eq!(service.list_by_user("U1").await, vec![ban]);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_state_untouched() {
        let (service, store, _) = setup().await;
        let inf = service
            .issue("U1", "M1", InfractionKind::Warning, "Reason", None)
            .await
            .unwrap();

        store.fail_writes.store(true, Ordering::SeqCst);

        assert!(matches!(
            service
                .issue("U1", "M1", InfractionKind::Strike, "Other", None)
                .await,
            Err(InfractionError::StorageError(_))
        ));
        assert!(matches!(
            service
                .edit(inf.id, "Changed", InfractionKind::Strike, None)
                .await,
            Err(InfractionError::StorageError(_))
        ));
        assert!(matches!(
            service.delete(inf.id).await,
            Err(InfractionError::StorageError(_))
        ));
        assert!(service
            .sweep_expired(t0() + Duration::days(30))
            .await
            .is_err());

        assert_eq!(service.list_by_user("U1").await, vec![inf.clone()]);

        // The id burned by the failed issue was never committed either
        store.fail_writes.store(false, Ordering::SeqCst);
        let next = service
            .issue("U1", "M1", InfractionKind::Strike, "Other", None)
            .await
            .unwrap();
        assert_eq!(next.id, inf.id + 1);
    }

    #[tokio::test]
    async fn test_record_action_rejects_expiring_kinds() {
        let (service, _, _) = setup().await;

        let timeout = service
            .record_action("U2", "M1", InfractionKind::Timeout, "Spam", Some(30))
            .await
            .unwrap();
        assert_eq!(timeout.duration_minutes, Some(30));
        assert_eq!(timeout.expires_at, None);

        assert!(matches!(
            service
                .record_action("U2", "M1", InfractionKind::Strike, "Spam", None)
                .await,
            Err(InfractionError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_reload_sees_committed_state() {
        let (service, store, clock) = setup().await;
        service
            .issue("U1", "M1", InfractionKind::Demotion, "a", Some("n"))
            .await
            .unwrap();
        service
            .record_action("U2", "M1", InfractionKind::Kick, "b", None)
            .await
            .unwrap();

        let reloaded = InfractionService::load(Arc::clone(&store), clock)
            .await
            .unwrap();
        assert_eq!(reloaded.list_by_user("U1").await, service.list_by_user("U1").await);
        assert_eq!(reloaded.list_by_user("U2").await, service.list_by_user("U2").await);
    }

    #[tokio::test]
    async fn test_concurrent_issues_get_distinct_ids() {
        let (service, _, _) = setup().await;
        let service = Arc::new(service);

        let mut handles = Vec::new();
        for i in 0..20 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service
                    .issue("U1", "M1", InfractionKind::Notice, &format!("r{}", i), None)
                    .await
                    .unwrap()
                    .id
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 20);
        assert_eq!(service.list_by_user("U1").await.len(), 20);
    }

    #[tokio::test]
    async fn test_import_assigns_fresh_ids() {
        let (service, _, _) = setup().await;
        service
            .issue("U1", "M1", InfractionKind::Notice, "existing", None)
            .await
            .unwrap();

        let old = t0() - Duration::days(3);
        let drafts = vec![InfractionDraft {
            user_id: "U9".to_string(),
            issuer_id: "M2".to_string(),
            kind: InfractionKind::Warn,
            reason: "legacy".to_string(),
            notes: String::new(),
            created_at: old,
            expires_at: None,
            duration_minutes: None,
        }];

        assert_eq!(service.import(drafts).await.unwrap(), 1);
        let imported = service.list_by_user("U9").await;
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].id, 2);
        assert_eq!(imported[0].created_at, old);
    }
}
