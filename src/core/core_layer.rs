// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "clock.rs"]
pub mod clock;

#[path = "infractions/mod.rs"]
pub mod infractions;

#[path = "cooldowns/cooldown_limiter.rs"]
pub mod cooldowns;

#[path = "requests/pending_requests.rs"]
pub mod requests;
