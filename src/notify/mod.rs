//! Outbound ticket notifications.
//!
//! Handlers call [`spawn_ticket_event`] after a comment or status change; the
//! webhook endpoints in [`hooks`] call [`dispatch_ticket_event`] directly for
//! rows written by other clients.

pub mod compose;
pub mod hooks;
pub mod sender;

use axum::{routing::post, Router};
use log::{debug, info, warn};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::tickets::storage::load_assignees;
use crate::tickets::types::Ticket;
use crate::users::storage::{emails_for, find_profile};

pub use compose::{compose_message, resolve_recipients, OutboundEmail, TicketEvent};
pub use sender::{HttpMailSender, MailSender, NoopMailSender, NotifyError};

pub fn configure_notify_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::HOOK_COMMENTS, post(hooks::handle_comment_hook))
        .route(ApiUrls::HOOK_TICKETS, post(hooks::handle_ticket_hook))
}

/// Resolves recipients for `event` and sends one message to all of them.
/// Returns the number of recipients; zero means nothing was sent.
pub async fn dispatch_ticket_event(
    state: &AppState,
    ticket: &Ticket,
    event: &TicketEvent,
    actor_id: Option<Uuid>,
) -> Result<usize, NotifyError> {
    if !state.mailer.is_enabled() {
        return Ok(0);
    }

    let pool = state.conn.clone();
    let ticket_id = ticket.id;
    let created_by = ticket.created_by;
    let (creator, assignees, actor) = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        let creator = match created_by {
            Some(id) => find_profile(&mut conn, id)?.map(|p| p.email),
            None => None,
        };
        let assignee_ids = load_assignees(&mut conn, ticket_id)?;
        let assignees = emails_for(&mut conn, &assignee_ids)?;
        let actor = match actor_id {
            Some(id) => find_profile(&mut conn, id)?.map(|p| p.email),
            None => None,
        };
        Ok::<_, NotifyError>((creator, assignees, actor))
    })
    .await
    .map_err(|e| NotifyError::Database(e.to_string()))??;

    let to = resolve_recipients(
        ticket.requester_email.as_deref(),
        creator.as_deref(),
        &assignees,
        actor.as_deref(),
    );
    if to.is_empty() {
        debug!("No recipients for {} on ticket {}", event.kind(), ticket.id);
        return Ok(0);
    }

    let link = compose::ticket_link(state.config.notify.app_base_url.as_deref(), ticket);
    let email = compose_message(ticket, event, to, link.as_deref());
    state.mailer.send(&email).await?;

    info!(
        "Notified {} recipient(s) of {} on ticket {}",
        email.to.len(),
        event.kind(),
        ticket.id
    );
    Ok(email.to.len())
}

/// Fire-and-forget dispatch from request handlers. Skipped when inline
/// notifications are turned off in favour of database webhooks.
pub fn spawn_ticket_event(
    state: &Arc<AppState>,
    ticket: Ticket,
    event: TicketEvent,
    actor_id: Option<Uuid>,
) {
    let notify = &state.config.notify;
    if !notify.enabled || !notify.inline {
        return;
    }

    let state = Arc::clone(state);
    tokio::spawn(async move {
        if let Err(e) = dispatch_ticket_event(&state, &ticket, &event, actor_id).await {
            warn!(
                "Failed to send {} notification for ticket {}: {e}",
                event.kind(),
                ticket.id
            );
        }
    });
}
