// Permission request flow after `/permission request` opens the form.
//
// 1. Form submitted -> pending request stored, posted to the request channel
//    with Accept/Deny buttons carrying the request id
// 2. Staff clicks a button -> note modal, carrying decision + request id
// 3. Note submitted -> request taken (once), staff post edited, requester DM'd

use crate::core::requests::{Decision, PermissionRequest};
use crate::core::cooldowns::CooldownKey;
use crate::discord::permissions::{member_has_clearance, Clearance};
use crate::discord::{Data, Error};
use poise::serenity_prelude::{
    self as serenity, ActionRow, ActionRowComponent, ButtonStyle, ComponentInteraction,
    CreateActionRow, CreateButton, CreateEmbed, CreateEmbedAuthor, CreateInputText,
    CreateInteractionResponse, CreateInteractionResponseMessage, CreateMessage, CreateModal,
    EditMessage, InputTextStyle, Interaction, ModalInteraction,
};
use tracing::{debug, error, info, warn};

pub const REQUEST_COOLDOWN: &str = "permission_request";

const REQUEST_FORM_ID: &str = "permission_request";
const BUTTON_PREFIX: &str = "perm_";
const NOTE_MODAL_PREFIX: &str = "perm_note:";
const EMBED_COLOR: u32 = 0x2d2d31;

pub fn button_id(decision: Decision, request_id: u64) -> String {
    format!("{}{}:{}", BUTTON_PREFIX, decision.as_str(), request_id)
}

pub fn note_modal_id(decision: Decision, request_id: u64) -> String {
    format!("{}{}:{}", NOTE_MODAL_PREFIX, decision.as_str(), request_id)
}

fn parse_decision_and_id(rest: &str) -> Option<(Decision, u64)> {
    let (decision, id) = rest.split_once(':')?;
    Some((Decision::parse(decision)?, id.parse().ok()?))
}

/// `perm_accept:7` -> (Accept, 7)
pub fn parse_button_id(custom_id: &str) -> Option<(Decision, u64)> {
    if custom_id.starts_with(NOTE_MODAL_PREFIX) {
        return None;
    }
    parse_decision_and_id(custom_id.strip_prefix(BUTTON_PREFIX)?)
}

/// `perm_note:deny:7` -> (Deny, 7)
pub fn parse_note_modal_id(custom_id: &str) -> Option<(Decision, u64)> {
    parse_decision_and_id(custom_id.strip_prefix(NOTE_MODAL_PREFIX)?)
}

pub fn cooldown_message(left: chrono::Duration) -> String {
    let seconds = (left.num_milliseconds() + 999) / 1000;
    format!(
        "Please wait {} more second(s) before submitting the form again.",
        seconds.max(1)
    )
}

pub fn request_form() -> CreateModal {
    CreateModal::new(REQUEST_FORM_ID, "Permission Request Form").components(vec![
        CreateActionRow::InputText(
            CreateInputText::new(InputTextStyle::Short, "Roblox Username", "roblox_username")
                .placeholder("Enter your Roblox username")
                .required(true),
        ),
        CreateActionRow::InputText(
            CreateInputText::new(InputTextStyle::Short, "Duration", "duration")
                .placeholder("Enter the duration (e.g., 1 hour, 30 minutes)")
                .required(true),
        ),
        CreateActionRow::InputText(
            CreateInputText::new(InputTextStyle::Paragraph, "Roleplay Request", "roleplay_request")
                .placeholder("Enter the roleplay you are requesting")
                .max_length(1000)
                .required(true),
        ),
        CreateActionRow::InputText(
            CreateInputText::new(InputTextStyle::Short, "Location (Optional)", "location")
                .placeholder("Enter the location (if applicable)")
                .required(false),
        ),
    ])
}

fn note_form(decision: Decision, request_id: u64) -> CreateModal {
    CreateModal::new(note_modal_id(decision, request_id), "Add a Note").components(vec![
        CreateActionRow::InputText(
            CreateInputText::new(InputTextStyle::Paragraph, "Add a note (optional)", "note")
                .max_length(1000)
                .required(false),
        ),
    ])
}

/// Non-empty value of a text input, trimmed.
fn input_value(rows: &[ActionRow], custom_id: &str) -> Option<String> {
    rows.iter()
        .flat_map(|row| row.components.iter())
        .find_map(|component| match component {
            ActionRowComponent::InputText(input) if input.custom_id == custom_id => input
                .value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
            _ => None,
        })
}

fn decision_word(decision: Decision) -> &'static str {
    match decision {
        Decision::Accept => "accepted",
        Decision::Deny => "denied",
    }
}

/// DM text for the requester.
pub fn requester_notice(decision: Decision, request: &PermissionRequest, note: Option<&str>) -> String {
    let mut text = format!(
        "Your permission request has been {} for **{}**.",
        decision_word(decision),
        request.roleplay_request
    );
    if let Some(note) = note {
        text.push_str(&format!("\n\n**Note:** {}", note));
    }
    text
}

/// Body of the staff post once a decision is in.
pub fn decision_summary(
    decision: Decision,
    request: &PermissionRequest,
    reviewer: &str,
    note: Option<&str>,
) -> String {
    let mut text = format!(
        "It has been **{}** for **{}** by **{}**\nRoblox Username: **{}**\nDuration: **{}**",
        decision_word(decision),
        request.roleplay_request,
        reviewer,
        request.roblox_username,
        request.duration
    );
    if let Some(location) = &request.location {
        text.push_str(&format!("\nLocation: **{}**", location));
    }
    if let Some(note) = note {
        text.push_str(&format!("\n\n**Note:** {}", note));
    }
    text
}

fn request_embed(request: &PermissionRequest, requester: &serenity::User) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .color(EMBED_COLOR)
        .author(CreateEmbedAuthor::new(&requester.name).icon_url(requester.face()))
        .title("Permission Request")
        .field("Roblox Username", &request.roblox_username, true)
        .field("Duration", &request.duration, true)
        .field("Roleplay Request", &request.roleplay_request, false)
        .timestamp(serenity::Timestamp::now());

    if let Some(location) = &request.location {
        embed = embed.field("Location", location, true);
    }
    embed
}

/// Staff and moderators both review requests.
fn can_decide(member: Option<&serenity::Member>, data: &Data) -> bool {
    member.is_some_and(|m| {
        member_has_clearance(m, &data.settings, Clearance::Staff)
            || member_has_clearance(m, &data.settings, Clearance::Moderator)
    })
}

pub async fn handle_interaction(
    ctx: &serenity::Context,
    data: &Data,
    interaction: &Interaction,
) -> Result<(), Error> {
    match interaction {
        Interaction::Component(component) => handle_component(ctx, data, component).await,
        Interaction::Modal(modal) => handle_modal(ctx, data, modal).await,
        // Slash commands belong to poise
        _ => Ok(()),
    }
}

async fn handle_component(
    ctx: &serenity::Context,
    data: &Data,
    component: &ComponentInteraction,
) -> Result<(), Error> {
    let custom_id = &component.data.custom_id;
    let Some((decision, request_id)) = parse_button_id(custom_id) else {
        debug!("Unknown component interaction: {}", custom_id);
        return Ok(());
    };

    if !can_decide(component.member.as_ref(), data) {
        return send_component_error(ctx, component, "You cannot decide permission requests.").await;
    }

    if data.requests.get(request_id).is_none() {
        return send_component_error(
            ctx,
            component,
            "Could not find the original request. It may have expired or already been decided.",
        )
        .await;
    }

    component
        .create_response(ctx, CreateInteractionResponse::Modal(note_form(decision, request_id)))
        .await?;
    Ok(())
}

async fn handle_modal(
    ctx: &serenity::Context,
    data: &Data,
    modal: &ModalInteraction,
) -> Result<(), Error> {
    let custom_id = &modal.data.custom_id;
    debug!("Modal submission: {}", custom_id);

    let result = if custom_id == REQUEST_FORM_ID {
        submit_request(ctx, data, modal).await
    } else if let Some((decision, request_id)) = parse_note_modal_id(custom_id) {
        record_decision(ctx, data, modal, decision, request_id).await
    } else {
        debug!("Unknown modal submission: {}", custom_id);
        Ok(())
    };

    if let Err(e) = result {
        error!("Modal submission error for {}: {:?}", custom_id, e);
        if let Err(e) =
            send_modal_error(ctx, modal, "An error occurred while processing your request.").await
        {
            warn!("Could not report modal error for {}: {}", custom_id, e);
        }
    }
    Ok(())
}

async fn submit_request(
    ctx: &serenity::Context,
    data: &Data,
    modal: &ModalInteraction,
) -> Result<(), Error> {
    let requester = &modal.user;

    let Some(channel_id) = data.settings.request_channel_id else {
        warn!("Permission request submitted but REQUEST_CHANNEL_ID is not set");
        return send_modal_error(ctx, modal, "Permission requests are not set up on this server.").await;
    };

    let rows = &modal.data.components;
    let (Some(roblox_username), Some(duration), Some(roleplay_request)) = (
        input_value(rows, "roblox_username"),
        input_value(rows, "duration"),
        input_value(rows, "roleplay_request"),
    ) else {
        return send_modal_error(ctx, modal, "Please fill in every required field.").await;
    };

    let key = CooldownKey::new(REQUEST_COOLDOWN, requester.id.get());
    let window = chrono::Duration::seconds(data.settings.request_cooldown_secs);
    if !data.cooldowns.try_acquire(key.clone(), window) {
        let left = data
            .cooldowns
            .remaining(&key, window)
            .unwrap_or_else(chrono::Duration::zero);
        return send_modal_error(ctx, modal, &cooldown_message(left)).await;
    }

    let request = PermissionRequest {
        requester_id: requester.id.get(),
        roblox_username,
        duration,
        roleplay_request,
        location: input_value(rows, "location"),
        posted_message: None,
    };
    let embed = request_embed(&request, requester);
    let request_id = data.requests.insert(request);

    let mut message = CreateMessage::new().embed(embed).components(vec![CreateActionRow::Buttons(vec![
        CreateButton::new(button_id(Decision::Accept, request_id))
            .label("Accept")
            .style(ButtonStyle::Success),
        CreateButton::new(button_id(Decision::Deny, request_id))
            .label("Deny")
            .style(ButtonStyle::Danger),
    ])]);
    if let Some(role) = data.settings.request_ping_role_id {
        message = message.content(format!("<@&{}>", role)).allowed_mentions(
            serenity::CreateAllowedMentions::new().roles(vec![serenity::RoleId::new(role)]),
        );
    }

    let posted = match serenity::ChannelId::new(channel_id)
        .send_message(ctx, message)
        .await
    {
        Ok(posted) => posted,
        Err(e) => {
            // Nothing was posted, so the attempt doesn't count.
            data.requests.take(request_id);
            data.cooldowns.release(&key);
            return Err(e.into());
        }
    };
    data.requests
        .attach_message(request_id, channel_id, posted.id.get());

    info!(
        request_id,
        requester_id = requester.id.get(),
        "Permission request posted"
    );

    modal
        .create_response(
            ctx,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content("Your request has been sent!")
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

async fn record_decision(
    ctx: &serenity::Context,
    data: &Data,
    modal: &ModalInteraction,
    decision: Decision,
    request_id: u64,
) -> Result<(), Error> {
    let reviewer = &modal.user;
    if !can_decide(modal.member.as_ref(), data) {
        return send_modal_error(ctx, modal, "You cannot decide permission requests.").await;
    }

    let Some(request) = data.requests.take(request_id) else {
        return send_modal_error(
            ctx,
            modal,
            "Could not find the original request. It may have expired or already been decided.",
        )
        .await;
    };
    let note = input_value(&modal.data.components, "note");

    if let Some((channel_id, message_id)) = request.posted_message {
        let embed = CreateEmbed::new()
            .color(EMBED_COLOR)
            .author(CreateEmbedAuthor::new(&reviewer.name).icon_url(reviewer.face()))
            .title("Permission Request Decision")
            .description(decision_summary(
                decision,
                &request,
                &reviewer.name,
                note.as_deref(),
            ))
            .timestamp(serenity::Timestamp::now());

        if let Err(e) = serenity::ChannelId::new(channel_id)
            .edit_message(
                ctx,
                serenity::MessageId::new(message_id),
                EditMessage::new().embed(embed).components(Vec::new()),
            )
            .await
        {
            // Someone else can still decide it.
            data.requests.restore(request_id, request);
            return Err(e.into());
        }
    }

    let notice = requester_notice(decision, &request, note.as_deref());
    let dm = match serenity::UserId::new(request.requester_id)
        .create_dm_channel(ctx)
        .await
    {
        Ok(channel) => channel
            .send_message(ctx, CreateMessage::new().content(notice))
            .await
            .map(|_| ()),
        Err(e) => Err(e),
    };
    if let Err(e) = dm {
        warn!(
            requester_id = request.requester_id,
            "Could not DM permission decision: {}", e
        );
    }

    info!(
        request_id,
        reviewer_id = reviewer.id.get(),
        decision = decision.as_str(),
        "Permission request decided"
    );

    modal
        .create_response(
            ctx,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content("The decision has been recorded.")
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

async fn send_component_error(
    ctx: &serenity::Context,
    component: &ComponentInteraction,
    message: &str,
) -> Result<(), Error> {
    component
        .create_response(
            ctx,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(message)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

async fn send_modal_error(
    ctx: &serenity::Context,
    modal: &ModalInteraction,
    message: &str,
) -> Result<(), Error> {
    modal
        .create_response(
            ctx,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(message)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}
