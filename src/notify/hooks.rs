use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use log::{debug, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::state::AppState;
use crate::notify::{dispatch_ticket_event, TicketEvent};
use crate::security::{secret_from_request, verify_shared_secret, WEBHOOK_SECRET_HEADER};
use crate::tickets::storage::load_ticket;
use crate::tickets::types::{Ticket, TicketComment, TicketStatus};
use crate::users::storage::find_profile;

/// Row-change event as delivered by the database webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    #[serde(rename = "type")]
    pub event_type: String,
    pub table: String,
    #[serde(default)]
    pub record: Option<Value>,
    #[serde(default)]
    pub old_record: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HookQuery {
    pub secret: Option<String>,
}

fn authorize(state: &AppState, headers: &HeaderMap, query: &HookQuery) -> ApiResult<()> {
    let provided = secret_from_request(headers, WEBHOOK_SECRET_HEADER, query.secret.as_deref());
    verify_shared_secret(state.config.notify.webhook_secret.as_deref(), provided).map_err(|e| {
        warn!("Rejected webhook call: {e}");
        ApiError::from(e)
    })
}

fn skipped(reason: &str) -> Json<Value> {
    debug!("Webhook skipped: {reason}");
    Json(json!({ "ok": true, "skipped": reason }))
}

/// The inserted comment, for `INSERT` events on `ticket_comments`.
pub fn comment_from_payload(payload: &WebhookPayload) -> Option<TicketComment> {
    if !payload.event_type.eq_ignore_ascii_case("INSERT") || payload.table != "ticket_comments" {
        return None;
    }
    serde_json::from_value(payload.record.clone()?).ok()
}

/// The new ticket row and the old/new status, for `UPDATE` events on
/// `tickets` that actually changed the status column.
pub fn status_change_from_payload(
    payload: &WebhookPayload,
) -> Option<(Ticket, TicketStatus, TicketStatus)> {
    if !payload.event_type.eq_ignore_ascii_case("UPDATE") || payload.table != "tickets" {
        return None;
    }
    let record = payload.record.clone()?;
    let old_status: TicketStatus = payload
        .old_record
        .as_ref()?
        .get("status")?
        .as_str()?
        .parse()
        .ok()?;
    let ticket: Ticket = serde_json::from_value(record).ok()?;
    let new_status: TicketStatus = ticket.status.parse().ok()?;

    if old_status == new_status {
        return None;
    }
    Some((ticket, old_status, new_status))
}

fn outcome(result: Result<usize, crate::notify::NotifyError>) -> Json<Value> {
    match result {
        Ok(sent) => Json(json!({ "ok": true, "recipients": sent })),
        Err(e) => {
            warn!("Webhook notification failed: {e}");
            Json(json!({ "ok": false }))
        }
    }
}

pub async fn handle_comment_hook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<HookQuery>,
    Json(payload): Json<WebhookPayload>,
) -> ApiResult<Json<Value>> {
    authorize(&state, &headers, &query)?;

    let Some(comment) = comment_from_payload(&payload) else {
        return Ok(skipped("not a comment insert"));
    };

    let pool = state.conn.clone();
    let ticket_id = comment.ticket_id;
    let author_id = comment.author_id;
    let loaded = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        let ticket = load_ticket(&mut conn, ticket_id)?.ticket;
        let author = find_profile(&mut conn, author_id)?;
        Ok::<_, ApiError>((ticket, author))
    })
    .await?;

    let (ticket, author) = match loaded {
        Ok(found) => found,
        Err(e) => {
            warn!("Comment webhook for ticket {ticket_id} failed: {e}");
            return Ok(Json(json!({ "ok": false })));
        }
    };

    let author_name = author
        .map(|p| p.full_name.unwrap_or(p.email))
        .unwrap_or_else(|| "Someone".to_string());
    let event = TicketEvent::CommentAdded {
        comment,
        author_name,
    };
    Ok(outcome(
        dispatch_ticket_event(&state, &ticket, &event, Some(author_id)).await,
    ))
}

pub async fn handle_ticket_hook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<HookQuery>,
    Json(payload): Json<WebhookPayload>,
) -> ApiResult<Json<Value>> {
    authorize(&state, &headers, &query)?;

    let Some((ticket, from, to)) = status_change_from_payload(&payload) else {
        return Ok(skipped("no status change"));
    };

    let event = TicketEvent::StatusChanged {
        from,
        to,
        actor_name: None,
    };
    Ok(outcome(
        dispatch_ticket_event(&state, &ticket, &event, None).await,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn ticket_record(status: &str) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "title": "Laptop",
            "description": null,
            "status": status,
            "priority": "normal",
            "created_by": null,
            "assigned_to": null,
            "due_date": null,
            "created_at": "2024-06-01T10:00:00.123456+00:00",
            "updated_at": "2024-06-01T10:00:00+00:00",
            "completed_at": null,
            "business": null,
            "source": "app",
            "requester_email": "r@example.com",
            "requester_name": null,
            "message_id": null
        })
    }

    #[test]
    fn test_status_change_detected() {
        let payload = WebhookPayload {
            event_type: "UPDATE".into(),
            table: "tickets".into(),
            record: Some(ticket_record("completed")),
            old_record: Some(ticket_record("in_progress")),
        };
        let (ticket, from, to) = status_change_from_payload(&payload).unwrap();
        assert_eq!(ticket.title, "Laptop");
        assert_eq!(from, TicketStatus::InProgress);
        assert_eq!(to, TicketStatus::Completed);
    }

    #[test]
    fn test_unchanged_status_ignored() {
        let payload = WebhookPayload {
            event_type: "UPDATE".into(),
            table: "tickets".into(),
            record: Some(ticket_record("open")),
            old_record: Some(ticket_record("open")),
        };
        assert!(status_change_from_payload(&payload).is_none());
    }

    #[test]
    fn test_wrong_table_or_type_ignored() {
        let insert = WebhookPayload {
            event_type: "INSERT".into(),
            table: "tickets".into(),
            record: Some(ticket_record("open")),
            old_record: None,
        };
        assert!(status_change_from_payload(&insert).is_none());
        assert!(comment_from_payload(&insert).is_none());
    }

    #[test]
    fn test_comment_insert_parsed() {
        let ticket_id = Uuid::new_v4();
        let payload: WebhookPayload = serde_json::from_value(json!({
            "type": "INSERT",
            "table": "ticket_comments",
            "record": {
                "id": Uuid::new_v4(),
                "ticket_id": ticket_id,
                "author_id": Uuid::new_v4(),
                "body": "Done on my side",
                "created_at": "2024-06-01T10:00:00+00:00"
            },
            "old_record": null
        }))
        .unwrap();
        let comment = comment_from_payload(&payload).unwrap();
        assert_eq!(comment.ticket_id, ticket_id);
        assert_eq!(comment.body, "Done on my side");
    }
}
