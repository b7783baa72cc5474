use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{Json, Response},
    routing::post,
    Router,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::command::{self, ParseResult, PartyCommand};
use crate::session::SessionId;
use crate::AppState;
use party_core::{ApplicationRequest, Decision, Party, PartyDraft, PartyError, UserId, MAX_REQUIREMENTS};

pub const SIGNATURE_HEADER: &str = "x-signature-256";

/// Largest interaction body read before the signature check (64KB).
///
/// A chat message plus its envelope is a few KB at most.
pub const MAX_INTERACTION_BODY_SIZE: usize = 64 * 1024;

/// A chat message forwarded by the relay, on behalf of `user_id`.
#[derive(Debug, Deserialize)]
pub struct InteractionRequest {
    pub user_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Channel or guild the message came from.
    pub context_id: String,
    pub text: String,
    /// Draft session the caller is working on, if any.
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InteractionResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub party_id: Option<String>,
}

impl InteractionResponse {
    fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }
}

type HmacSha256 = Hmac<Sha256>;

fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Some(signature_hex) = signature.strip_prefix("sha256=") else {
        return false;
    };

    let signature_bytes = match hex::decode(signature_hex) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };

    mac.update(payload);

    // Constant-time comparison
    mac.verify_slice(&signature_bytes).is_ok()
}

async fn verify_interaction_signature(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_INTERACTION_BODY_SIZE)
        .await
        .map_err(|_| {
            error!("Interaction body too large or read error");
            StatusCode::PAYLOAD_TOO_LARGE
        })?;

    let signature = parts
        .headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !verify_signature(&state.webhook_secret, &bytes, signature) {
        error!("Invalid interaction signature");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let request = Request::from_parts(parts, axum::body::Body::from(bytes));
    Ok(next.run(request).await)
}

pub async fn interaction_handler(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<InteractionResponse>, StatusCode> {
    let (_parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_INTERACTION_BODY_SIZE)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let interaction: InteractionRequest =
        serde_json::from_slice(&bytes).map_err(|_| StatusCode::BAD_REQUEST)?;

    let response = match command::parse_message(&interaction.text) {
        ParseResult::NoMention => InteractionResponse::default(),
        ParseResult::UnrecognizedCommand { attempted } => {
            info!(
                "Unrecognized command '{}' from {}",
                attempted, interaction.user_id
            );
            InteractionResponse::text(format!(
                "Unknown command `{}`. Start with `!party create <max members> <title>`.",
                attempted
            ))
        }
        ParseResult::Malformed { command, usage } => {
            info!("Malformed '{}' command from {}", command, interaction.user_id);
            InteractionResponse::text(format!("Usage: `{}`", usage))
        }
        ParseResult::Command(command) => {
            info!("Processing '{}' from {}", command, interaction.user_id);
            match run_command(&state, &interaction, command).await {
                Ok(response) => response,
                Err(err) => {
                    match &err {
                        PartyError::Storage { .. } => {
                            error!("Command from {} failed: {}", interaction.user_id, err)
                        }
                        PartyError::Contended(_) => {
                            warn!("Command from {} gave up: {}", interaction.user_id, err)
                        }
                        _ => info!("Command from {} refused: {}", interaction.user_id, err),
                    }
                    InteractionResponse::text(err.user_message())
                }
            }
        }
    };

    Ok(Json(response))
}

fn session_of(interaction: &InteractionRequest) -> Result<SessionId, PartyError> {
    interaction
        .session_id
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(SessionId::from)
        .ok_or(PartyError::SessionExpired)
}

fn describe_draft(draft: &PartyDraft) -> String {
    let mut text = format!(
        "Draft **{}** (max {} members), requirements {}/{}:",
        draft.title,
        draft.max_members,
        draft.requirements.len(),
        MAX_REQUIREMENTS
    );
    if draft.requirements.is_empty() {
        text.push_str(" none");
    }
    for requirement in &draft.requirements {
        text.push_str(&format!("\n- {}", requirement.name));
    }
    text
}

fn describe_party(party: &Party) -> String {
    let mut text = format!(
        "**{}** [{}] {}/{} members, {}",
        party.title,
        party.id,
        party.member_count(),
        party.max_members,
        party.status
    );
    if let Some(description) = &party.description {
        text.push_str(&format!("\n{}", description));
    }
    for requirement in &party.requirements {
        match &requirement.description {
            Some(description) => {
                text.push_str(&format!("\n- {}: {}", requirement.name, description))
            }
            None => text.push_str(&format!("\n- {}", requirement.name)),
        }
    }
    text
}

/// Run one parsed command for the caller and dispatch whatever it produced.
async fn run_command(
    state: &AppState,
    interaction: &InteractionRequest,
    command: PartyCommand,
) -> Result<InteractionResponse, PartyError> {
    let service = &state.service;
    let caller = UserId::from(interaction.user_id.as_str());

    let response = match command {
        PartyCommand::Create {
            max_members,
            title,
            description,
        } => {
            let (session, draft) = service
                .start_draft(&caller, &title, max_members, description.as_deref())
                .await?;
            InteractionResponse {
                message: format!(
                    "Started a draft for **{}**. Add requirements with `!party req add <name>`, then `!party publish`.",
                    draft.title
                ),
                session_id: Some(session.to_string()),
                party_id: None,
            }
        }

        PartyCommand::AddRequirement { name, description } => {
            let session = session_of(interaction)?;
            let draft = service
                .add_requirement(&session, &caller, &name, description.as_deref())
                .await?;
            InteractionResponse::text(describe_draft(&draft))
        }

        PartyCommand::RemoveRequirement => {
            let session = session_of(interaction)?;
            let (draft, removed) = service.remove_last_requirement(&session, &caller).await?;
            let head = match removed {
                Some(requirement) => format!("Removed **{}**.\n", requirement.name),
                None => "There were no requirements to remove.\n".to_string(),
            };
            InteractionResponse::text(head + &describe_draft(&draft))
        }

        PartyCommand::ShowDraft => {
            let session = session_of(interaction)?;
            InteractionResponse::text(describe_draft(&service.draft(&session, &caller).await?))
        }

        PartyCommand::Publish => {
            let session = session_of(interaction)?;
            let outcome = service
                .finalize(&session, &caller, &interaction.context_id)
                .await?;
            state.dispatcher.dispatch(outcome.effects);
            InteractionResponse {
                message: format!("Your party is open!\n{}", describe_party(&outcome.value)),
                session_id: None,
                party_id: Some(outcome.value.id.to_string()),
            }
        }

        PartyCommand::Cancel => {
            let session = session_of(interaction)?;
            service.cancel_draft(&session, &caller).await?;
            InteractionResponse::text("Draft discarded.")
        }

        PartyCommand::Join(party_id) => {
            let outcome = service.join(&party_id, &caller).await?;
            state.dispatcher.dispatch(outcome.effects);
            InteractionResponse::text(format!(
                "You joined **{}** ({}/{}).",
                outcome.value.title,
                outcome.value.member_count(),
                outcome.value.max_members
            ))
        }

        PartyCommand::Apply { party, responses } => {
            let mut answers = HashMap::new();
            for (name, answer) in responses {
                if answers.insert(name.clone(), answer).is_some() {
                    return Err(PartyError::validation(format!(
                        "You answered **{}** more than once.",
                        name
                    )));
                }
            }
            let request = ApplicationRequest {
                applicant: caller.clone(),
                display_name: interaction.display_name.clone().unwrap_or_default(),
                responses: answers,
            };
            let outcome = service.submit(&party, request).await?;
            state.dispatcher.dispatch(outcome.effects);
            InteractionResponse::text("Application sent. The party leader will review it.")
        }

        PartyCommand::Form(party_id) => {
            let form = service.application_form(&party_id).await?;
            if form.is_empty() {
                InteractionResponse::text(format!(
                    "No application needed. Use `!party join {}`.",
                    party_id
                ))
            } else {
                let fields: Vec<String> = form.iter().map(|r| format!("{}: ...", r.name)).collect();
                InteractionResponse::text(format!(
                    "`!party apply {} {}`",
                    party_id,
                    fields.join(" | ")
                ))
            }
        }

        PartyCommand::Approve(application_id) => {
            let outcome = service
                .decide(&application_id, &caller, Decision::Approve)
                .await?;
            state.dispatcher.dispatch(outcome.effects);
            InteractionResponse::text(format!(
                "Approved {}.",
                outcome.value.applicant_display_name
            ))
        }

        PartyCommand::Reject(application_id) => {
            let outcome = service
                .decide(&application_id, &caller, Decision::Reject)
                .await?;
            state.dispatcher.dispatch(outcome.effects);
            InteractionResponse::text(format!(
                "Rejected {}.",
                outcome.value.applicant_display_name
            ))
        }

        PartyCommand::Leave(party_id) => {
            let outcome = service.leave(&party_id, &caller).await?;
            state.dispatcher.dispatch(outcome.effects);
            InteractionResponse::text(format!("You left **{}**.", outcome.value.title))
        }

        PartyCommand::Close(party_id) => {
            let outcome = service.close(&party_id, &caller).await?;
            state.dispatcher.dispatch(outcome.effects);
            InteractionResponse::text(format!(
                "**{}** is closed to new members.",
                outcome.value.title
            ))
        }

        PartyCommand::Delete(party_id) => {
            let outcome = service.delete(&party_id, &caller).await?;
            let notified = outcome.value.notified.len();
            state.dispatcher.dispatch(outcome.effects);
            InteractionResponse::text(format!(
                "**{}** was deleted. {} member(s) notified.",
                outcome.value.party.title, notified
            ))
        }

        PartyCommand::Kick { party, target } => {
            let outcome = service.kick(&party, &caller, &target).await?;
            state.dispatcher.dispatch(outcome.effects);
            InteractionResponse::text(format!(
                "Removed {} from **{}**.",
                target, outcome.value.title
            ))
        }

        PartyCommand::Message { party, body } => {
            let outcome = service.announce(&party, &caller, &body).await?;
            let sent = outcome.value.len();
            state.dispatcher.dispatch(outcome.effects);
            InteractionResponse::text(format!("Message sent to {} member(s).", sent))
        }

        PartyCommand::Posted { party, message_id } => {
            let outcome = service
                .attach_origin_message(&party, &caller, &message_id)
                .await?;
            state.dispatcher.dispatch(outcome.effects);
            InteractionResponse {
                message: "Listing linked.".to_string(),
                session_id: None,
                party_id: Some(outcome.value.id.to_string()),
            }
        }

        PartyCommand::Mine => {
            let mine = service.my_parties(&caller).await?;
            if mine.created.is_empty() && mine.joined.is_empty() {
                InteractionResponse::text("You are not in any open parties.")
            } else {
                let mut lines = Vec::new();
                for party in &mine.created {
                    lines.push(format!("(leader) {}", describe_party(party)));
                }
                for party in &mine.joined {
                    lines.push(describe_party(party));
                }
                InteractionResponse::text(lines.join("\n\n"))
            }
        }

        PartyCommand::Pending => {
            let pending = service.pending_for_creator(&caller).await?;
            if pending.is_empty() {
                InteractionResponse::text("No pending applications.")
            } else {
                let lines: Vec<String> = pending
                    .iter()
                    .map(|p| {
                        format!(
                            "{} for **{}** from {} ({})",
                            p.application.id,
                            p.party_title,
                            p.application.applicant_display_name,
                            p.application.applicant
                        )
                    })
                    .collect();
                InteractionResponse::text(lines.join("\n"))
            }
        }

        PartyCommand::Show(party_id) => {
            InteractionResponse::text(describe_party(&service.view(&party_id).await?))
        }
    };

    Ok(response)
}

pub fn webhook_router(middleware_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/interactions", post(interaction_handler))
        .route_layer(middleware::from_fn_with_state(
            middleware_state,
            verify_interaction_signature,
        ))
}
