use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::schema::ticket_comments;
use crate::core::shared::state::AppState;
use crate::notify::{spawn_ticket_event, TicketEvent};
use crate::security::{policy, AuthenticatedUser};
use crate::tickets::storage::load_ticket;
use crate::tickets::types::{CommentView, CreateCommentRequest, TicketComment};
use crate::users::storage::{load_summaries, roles_for};

pub const MAX_COMMENT_LENGTH: usize = 20_000;

/// Attaches author summaries to comments, keeping their order.
pub fn comment_views(
    conn: &mut PgConnection,
    comments: Vec<TicketComment>,
) -> QueryResult<Vec<CommentView>> {
    let mut author_ids: Vec<Uuid> = comments.iter().map(|c| c.author_id).collect();
    author_ids.sort();
    author_ids.dedup();

    let authors: HashMap<Uuid, _> = load_summaries(conn, &author_ids)?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    Ok(comments
        .into_iter()
        .map(|comment| CommentView {
            author: authors.get(&comment.author_id).cloned(),
            comment,
        })
        .collect())
}

pub async fn handle_list_comments(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(ticket_id): Path<Uuid>,
) -> ApiResult<Json<Vec<CommentView>>> {
    let pool = state.conn.clone();

    let result = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        let loaded = load_ticket(&mut conn, ticket_id)?;
        if !policy::can_view_ticket(&user, &loaded.access()) {
            return Err(ApiError::NotFound("Ticket not found".to_string()));
        }
        let comments: Vec<TicketComment> = ticket_comments::table
            .filter(ticket_comments::ticket_id.eq(ticket_id))
            .order(ticket_comments::created_at.asc())
            .load(&mut conn)?;
        comment_views(&mut conn, comments).map_err(ApiError::from)
    })
    .await??;

    Ok(Json(result))
}

pub async fn handle_create_comment(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(ticket_id): Path<Uuid>,
    Json(req): Json<CreateCommentRequest>,
) -> ApiResult<(StatusCode, Json<TicketComment>)> {
    let body = req.body.trim().to_string();
    if body.is_empty() {
        return Err(ApiError::Validation("Comment body is required".to_string()));
    }
    if body.len() > MAX_COMMENT_LENGTH {
        return Err(ApiError::Validation(format!(
            "Comment exceeds {MAX_COMMENT_LENGTH} characters"
        )));
    }

    let pool = state.conn.clone();
    let actor = user.clone();
    let (ticket, comment) = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        let loaded = load_ticket(&mut conn, ticket_id)?;
        if !policy::can_comment(&actor, &loaded.access()) {
            return Err(ApiError::NotFound("Ticket not found".to_string()));
        }

        let comment = TicketComment {
            id: Uuid::new_v4(),
            ticket_id,
            author_id: actor.user_id,
            body,
            created_at: Utc::now(),
        };
        diesel::insert_into(ticket_comments::table)
            .values(&comment)
            .execute(&mut conn)?;
        Ok((loaded.ticket, comment))
    })
    .await??;

    info!("Comment {} added to ticket {ticket_id}", comment.id);
    spawn_ticket_event(
        &state,
        ticket,
        TicketEvent::CommentAdded {
            comment: comment.clone(),
            author_name: user.display_name().to_string(),
        },
        Some(user.user_id),
    );

    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn handle_delete_comment(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let pool = state.conn.clone();
    let user_id = user.user_id;

    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        let comment = ticket_comments::table
            .find(id)
            .first::<TicketComment>(&mut conn)
            .optional()?
            .ok_or_else(|| ApiError::NotFound("Comment not found".to_string()))?;

        let author_role = roles_for(&mut conn, &[comment.author_id])?
            .get(&comment.author_id)
            .copied();
        if !policy::can_delete_comment(&user, comment.author_id, author_role) {
            warn!(
                "User {} ({}) may not delete comment {id} by {}",
                user.user_id, user.role, comment.author_id
            );
            return Err(ApiError::forbidden());
        }

        diesel::delete(ticket_comments::table.find(id)).execute(&mut conn)?;
        Ok(())
    })
    .await??;

    info!("Comment {id} deleted by {user_id}");
    Ok(StatusCode::NO_CONTENT)
}
