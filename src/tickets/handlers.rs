use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use log::{info, warn};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::schema::{ticket_attachments, ticket_comments, tickets};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{non_empty, normalize_email};
use crate::notify::{spawn_ticket_event, TicketEvent};
use crate::security::{policy, AuthenticatedUser, Role};
use crate::tickets::comments::comment_views;
use crate::tickets::storage::{
    self, load_assignee_map, load_ticket, replace_assignees, LoadedTicket,
};
use crate::tickets::types::{
    clearable_text, CreateTicketRequest, ListTicketsQuery, SetAssigneesRequest, StatsQuery,
    StatusAction, Ticket, TicketAttachment, TicketChanges, TicketComment, TicketDetail,
    TicketSource, TicketStats, TicketStatus, TicketView, UpdateTicketRequest,
};
use crate::users::storage::{load_summaries, roles_for};

fn view(loaded: LoadedTicket) -> TicketView {
    TicketView::new(loaded.ticket, loaded.assignees, Utc::now())
}

pub async fn handle_list_tickets(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<ListTicketsQuery>,
) -> ApiResult<Json<Vec<TicketView>>> {
    let pool = state.conn.clone();

    let result = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        let now = Utc::now();
        let rows = storage::list_tickets(&mut conn, &user, query, now)?;
        let ids: Vec<Uuid> = rows.iter().map(|t| t.id).collect();
        let mut assignees = load_assignee_map(&mut conn, &ids)?;

        Ok::<_, ApiError>(
            rows.into_iter()
                .map(|t| {
                    let list = assignees.remove(&t.id).unwrap_or_default();
                    TicketView::new(t, list, now)
                })
                .collect(),
        )
    })
    .await??;

    Ok(Json(result))
}

pub async fn handle_ticket_stats(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<StatsQuery>,
) -> ApiResult<Json<TicketStats>> {
    let pool = state.conn.clone();
    let stats = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        storage::ticket_stats(&mut conn, &user, query, Utc::now()).map_err(ApiError::from)
    })
    .await??;

    Ok(Json(stats))
}

pub async fn handle_create_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<CreateTicketRequest>,
) -> ApiResult<(StatusCode, Json<TicketView>)> {
    if !policy::can_create_ticket(&user) {
        warn!("User {} is not allowed to create tickets", user.user_id);
        return Err(ApiError::Forbidden(
            "Your account is not allowed to create tickets".to_string(),
        ));
    }

    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::Validation("Title is required".to_string()));
    }

    // End users always file tickets for themselves.
    let (requester_email, requester_name) = if user.is_staff() {
        (
            non_empty(req.requester_email).map(|e| normalize_email(&e)),
            non_empty(req.requester_name),
        )
    } else {
        (Some(normalize_email(&user.email)), user.full_name.clone())
    };

    let assignees = if user.is_manager() {
        req.assignees
    } else {
        Vec::new()
    };

    let now = Utc::now();
    let ticket = Ticket {
        id: Uuid::new_v4(),
        title,
        description: non_empty(req.description),
        status: TicketStatus::Open.as_str().to_string(),
        priority: req.priority.unwrap_or_default().as_str().to_string(),
        created_by: Some(user.user_id),
        assigned_to: None,
        due_date: req.due_date,
        created_at: now,
        updated_at: now,
        completed_at: None,
        business: non_empty(req.business),
        source: TicketSource::App.as_str().to_string(),
        requester_email,
        requester_name,
        message_id: None,
    };

    let pool = state.conn.clone();
    let loaded = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        if !assignees.is_empty() {
            ensure_staff(&mut conn, &assignees)?;
        }
        conn.transaction(|conn| {
            diesel::insert_into(tickets::table)
                .values(&ticket)
                .execute(conn)?;
            if !assignees.is_empty() {
                replace_assignees(conn, ticket.id, &assignees)?;
            }
            Ok::<_, diesel::result::Error>(())
        })?;
        load_ticket(&mut conn, ticket.id)
    })
    .await??;

    info!(
        "Ticket {} created by {} ({})",
        loaded.ticket.id, user.user_id, loaded.ticket.priority
    );
    Ok((StatusCode::CREATED, Json(view(loaded))))
}

pub async fn handle_get_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TicketDetail>> {
    let pool = state.conn.clone();

    let detail = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        let loaded = load_ticket(&mut conn, id)?;
        if !policy::can_view_ticket(&user, &loaded.access()) {
            return Err(ApiError::NotFound("Ticket not found".to_string()));
        }

        let comments: Vec<TicketComment> = ticket_comments::table
            .filter(ticket_comments::ticket_id.eq(id))
            .order(ticket_comments::created_at.asc())
            .load(&mut conn)?;
        let comments = comment_views(&mut conn, comments)?;

        let attachments: Vec<TicketAttachment> = ticket_attachments::table
            .filter(ticket_attachments::ticket_id.eq(id))
            .order(ticket_attachments::created_at.asc())
            .load(&mut conn)?;

        let mut assignee_profiles = load_summaries(&mut conn, &loaded.assignees)?;
        assignee_profiles.sort_by_key(|p| {
            loaded
                .assignees
                .iter()
                .position(|a| *a == p.id)
                .unwrap_or(usize::MAX)
        });

        Ok(TicketDetail {
            ticket: view(loaded),
            assignee_profiles,
            comments,
            attachments,
        })
    })
    .await??;

    Ok(Json(detail))
}

pub async fn handle_update_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTicketRequest>,
) -> ApiResult<Json<TicketView>> {
    if req.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::Validation("Title cannot be empty".to_string()));
    }

    let changes = TicketChanges {
        title: req.title.map(|t| t.trim().to_string()),
        description: clearable_text(req.description),
        priority: req.priority.map(|p| p.as_str().to_string()),
        due_date: req.due_date,
        business: clearable_text(req.business),
        updated_at: Some(Utc::now()),
    };

    let pool = state.conn.clone();
    let loaded = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        let loaded = load_ticket(&mut conn, id)?;
        if !policy::can_modify_ticket(&user, &loaded.access()) {
            return Err(ApiError::forbidden());
        }
        diesel::update(tickets::table.find(id))
            .set(&changes)
            .execute(&mut conn)?;
        load_ticket(&mut conn, id)
    })
    .await??;

    Ok(Json(view(loaded)))
}

async fn apply_status_action(
    state: Arc<AppState>,
    user: AuthenticatedUser,
    id: Uuid,
    action: StatusAction,
) -> ApiResult<Json<TicketView>> {
    let pool = state.conn.clone();
    let actor = user.clone();

    let (loaded, from) = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        let current = load_ticket(&mut conn, id)?;
        if !policy::can_modify_ticket(&actor, &current.access()) {
            return Err(ApiError::forbidden());
        }

        let from = current.ticket.status();
        let to = action.apply(from).map_err(ApiError::Conflict)?;
        let now = Utc::now();

        let target = tickets::table.find(id);
        match action {
            StatusAction::Complete => diesel::update(target)
                .set((
                    tickets::status.eq(to.as_str()),
                    tickets::completed_at.eq(Some(now)),
                    tickets::updated_at.eq(now),
                ))
                .execute(&mut conn)?,
            StatusAction::Reactivate => diesel::update(target)
                .set((
                    tickets::status.eq(to.as_str()),
                    tickets::completed_at.eq(None::<chrono::DateTime<Utc>>),
                    tickets::updated_at.eq(now),
                ))
                .execute(&mut conn)?,
            _ => diesel::update(target)
                .set((tickets::status.eq(to.as_str()), tickets::updated_at.eq(now)))
                .execute(&mut conn)?,
        };

        Ok((load_ticket(&mut conn, id)?, from))
    })
    .await??;

    let to = loaded.ticket.status();
    info!("Ticket {} {} -> {} by {}", id, from, to, user.user_id);
    spawn_ticket_event(
        &state,
        loaded.ticket.clone(),
        TicketEvent::StatusChanged {
            from,
            to,
            actor_name: Some(user.display_name().to_string()),
        },
        Some(user.user_id),
    );

    Ok(Json(view(loaded)))
}

pub async fn handle_start_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TicketView>> {
    apply_status_action(state, user, id, StatusAction::Start).await
}

pub async fn handle_hold_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TicketView>> {
    apply_status_action(state, user, id, StatusAction::Hold).await
}

pub async fn handle_complete_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TicketView>> {
    apply_status_action(state, user, id, StatusAction::Complete).await
}

pub async fn handle_reactivate_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TicketView>> {
    apply_status_action(state, user, id, StatusAction::Reactivate).await
}

pub async fn handle_archive_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TicketView>> {
    apply_status_action(state, user, id, StatusAction::Archive).await
}

pub async fn handle_take_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TicketView>> {
    if !user.is_staff() {
        return Err(ApiError::forbidden());
    }

    let pool = state.conn.clone();
    let user_id = user.user_id;
    let loaded = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        let current = load_ticket(&mut conn, id)?;
        if !policy::can_take_ticket(&user, &current.access()) {
            return Err(ApiError::Conflict("Ticket is already assigned".to_string()));
        }
        replace_assignees(&mut conn, id, &[user.user_id])?;
        load_ticket(&mut conn, id)
    })
    .await??;

    info!("Ticket {id} taken by {user_id}");
    Ok(Json(view(loaded)))
}

pub async fn handle_set_assignees(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<SetAssigneesRequest>,
) -> ApiResult<Json<TicketView>> {
    if !policy::can_manage_assignees(&user) {
        return Err(ApiError::forbidden());
    }

    let pool = state.conn.clone();
    let count = req.assignees.len();
    let loaded = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        load_ticket(&mut conn, id)?;
        ensure_staff(&mut conn, &req.assignees)?;
        replace_assignees(&mut conn, id, &req.assignees)?;
        load_ticket(&mut conn, id)
    })
    .await??;

    let manager = user.user_id;
    info!("Manager {manager} set {count} assignee(s) on ticket {id}");
    Ok(Json(view(loaded)))
}

/// Tickets are only assigned to managers and technicians.
fn ensure_staff(conn: &mut PgConnection, ids: &[Uuid]) -> ApiResult<()> {
    let roles = roles_for(conn, ids)?;
    for id in ids {
        match roles.get(id) {
            Some(role) if role.is_staff() => {}
            Some(Role::UserClient) => {
                return Err(ApiError::Validation(format!(
                    "User {id} cannot be assigned tickets"
                )))
            }
            _ => return Err(ApiError::Validation(format!("Unknown user {id}"))),
        }
    }
    Ok(())
}
