// Shared per-command cooldowns.
//
// One limiter for the whole bot, keyed by (command, user), instead of a
// separate map inside every command.

use crate::core::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CooldownKey {
    pub command: &'static str,
    pub user_id: u64,
}

impl CooldownKey {
    pub fn new(command: &'static str, user_id: u64) -> Self {
        Self { command, user_id }
    }
}

pub struct CooldownLimiter {
    clock: Arc<dyn Clock>,
    last_used: DashMap<CooldownKey, DateTime<Utc>>,
}

impl CooldownLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last_used: DashMap::new(),
        }
    }

    /// Claim the key if its last use is at least `window` ago.
    ///
    /// Check and update happen under the map's shard lock, so two callers
    /// racing for the same key can't both succeed.
    pub fn try_acquire(&self, key: CooldownKey, window: Duration) -> bool {
        let now = self.clock.now();
        match self.last_used.entry(key) {
            Entry::Occupied(mut entry) => {
                if now - *entry.get() < window {
                    false
                } else {
                    entry.insert(now);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    /// How long until `key` can be acquired again, if it's cooling down.
    pub fn remaining(&self, key: &CooldownKey, window: Duration) -> Option<Duration> {
        let now = self.clock.now();
        self.last_used.get(key).and_then(|last| {
            let left = *last + window - now;
            (left > Duration::zero()).then_some(left)
        })
    }

    /// Give back a claim whose action never happened.
    pub fn release(&self, key: &CooldownKey) {
        self.last_used.remove(key);
    }

    /// Forget entries older than `window`. Returns how many were dropped.
    pub fn prune(&self, window: Duration) -> usize {
        let now = self.clock.now();
        let before = self.last_used.len();
        self.last_used.retain(|_, last| now - *last < window);
        before - self.last_used.len()
    }
}
