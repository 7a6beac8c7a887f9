// File-backed persistence for the infraction ledger.

pub mod json_store;
pub mod legacy_import;

pub use json_store::JsonInfractionStore;
