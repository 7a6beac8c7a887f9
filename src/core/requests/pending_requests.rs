// Pending permission requests awaiting a staff decision.
//
// Each request gets its own id (used in the Accept/Deny button ids), so a
// user filing a second request can't clobber the first. Entries expire after
// a TTL so abandoned requests don't pile up forever.

use crate::core::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// What a member asked for in the permission request form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRequest {
    pub requester_id: u64,
    pub roblox_username: String,
    pub duration: String,
    pub roleplay_request: String,
    pub location: Option<String>,
    /// Where the staff-facing copy was posted, once it has been.
    pub posted_message: Option<(u64, u64)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Deny,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Accept => "accept",
            Decision::Deny => "deny",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "accept" => Some(Decision::Accept),
            "deny" => Some(Decision::Deny),
            _ => None,
        }
    }
}

struct PendingEntry {
    request: PermissionRequest,
    expires_at: DateTime<Utc>,
}

pub struct PendingRequests {
    clock: Arc<dyn Clock>,
    ttl: Duration,
    next_id: AtomicU64,
    entries: DashMap<u64, PendingEntry>,
}

impl PendingRequests {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            clock,
            ttl,
            next_id: AtomicU64::new(1),
            entries: DashMap::new(),
        }
    }

    /// Store a request and return its id.
    pub fn insert(&self, request: PermissionRequest) -> u64 {
        self.prune_expired();

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let expires_at = self.clock.now() + self.ttl;
        self.entries.insert(id, PendingEntry { request, expires_at });
        id
    }

    /// Remember where the request was posted. False if it is gone.
    pub fn attach_message(&self, id: u64, channel_id: u64, message_id: u64) -> bool {
        match self.entries.get_mut(&id) {
            Some(mut entry) => {
                entry.request.posted_message = Some((channel_id, message_id));
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: u64) -> Option<PermissionRequest> {
        let now = self.clock.now();
        self.entries
            .get(&id)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.request.clone())
    }

    /// Remove and return a live request. Only one caller ever gets it.
    pub fn take(&self, id: u64) -> Option<PermissionRequest> {
        let now = self.clock.now();
        self.entries
            .remove(&id)
            .filter(|(_, entry)| entry.expires_at > now)
            .map(|(_, entry)| entry.request)
    }

    /// Put back a request whose decision could not be completed.
    pub fn restore(&self, id: u64, request: PermissionRequest) {
        let expires_at = self.clock.now() + self.ttl;
        self.entries.insert(id, PendingEntry { request, expires_at });
    }

    pub fn prune_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use chrono::TimeZone;

    fn request(requester_id: u64) -> PermissionRequest {
        PermissionRequest {
            requester_id,
            roblox_username: "builder_man".to_string(),
            duration: "30 minutes".to_string(),
            roleplay_request: "Bank robbery".to_string(),
            location: None,
            posted_message: None,
        }
    }

    fn setup() -> (PendingRequests, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        ));
        (PendingRequests::new(clock.clone(), Duration::hours(24)), clock)
    }

    #[test]
    fn test_same_user_keeps_both_requests() {
        let (store, _) = setup();
        let first = store.insert(request(7));
        let second = store.insert(request(7));

        assert_ne!(first, second);
        assert!(store.get(first).is_some());
        assert!(store.get(second).is_some());
    }

    #[test]
    fn test_take_is_single_use() {
        let (store, _) = setup();
        let id = store.insert(request(7));
        assert!(store.attach_message(id, 100, 200));

        let taken = store.take(id).unwrap();
        assert_eq!(taken.posted_message, Some((100, 200)));
        assert!(store.take(id).is_none());
        assert!(!store.attach_message(id, 100, 200));
    }

    #[test]
    fn test_requests_expire() {
        let (store, clock) = setup();
        let id = store.insert(request(7));

        clock.advance(Duration::hours(24));
        assert!(store.get(id).is_none());
        assert!(store.take(id).is_none());

        let stale = store.insert(request(8));
        clock.advance(Duration::hours(25));
        assert_eq!(store.prune_expired(), 1);
        assert!(store.get(stale).is_none());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_restore_after_failed_decision() {
        let (store, _) = setup();
        let id = store.insert(request(9));
        let taken = store.take(id).unwrap();

        store.restore(id, taken.clone());
        assert_eq!(store.get(id), Some(taken));
    }

    #[test]
    fn test_decision_round_trip() {
        for decision in [Decision::Accept, Decision::Deny] {
            assert_eq!(Decision::parse(decision.as_str()), Some(decision));
        }
        assert_eq!(Decision::parse("maybe"), None);
    }
}
