// Core infraction module - the moderation ledger.
// Same layout as the other core features: models + service (with its store port).

pub mod infraction_models;
pub mod infraction_service;

pub use infraction_models::*;
pub use infraction_service::*;
