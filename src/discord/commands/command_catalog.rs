// Discord commands module.
// Each feature gets its own command file.

pub mod infraction;

pub mod moderation;

pub mod permission;
