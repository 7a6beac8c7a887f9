// Discord layer - commands, notifications and component handlers.
//
// Everything here translates between serenity/poise types and the core
// services. No ledger rules live in this layer.

use crate::config::Settings;
use crate::core::cooldowns::CooldownLimiter;
use crate::core::infractions::InfractionService;
use crate::core::requests::PendingRequests;
use crate::infra::infractions::JsonInfractionStore;
use std::sync::Arc;

#[path = "commands/command_catalog.rs"]
pub mod commands;

#[path = "notifier.rs"]
pub mod notifier;

#[path = "permissions.rs"]
pub mod permissions;

#[path = "requests/request_handler.rs"]
pub mod request_handler;

/// Shared state handed to every command and event handler.
pub struct Data {
    pub settings: Arc<Settings>,
    pub infractions: Arc<InfractionService<JsonInfractionStore>>,
    pub cooldowns: Arc<CooldownLimiter>,
    pub requests: Arc<PendingRequests>,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
