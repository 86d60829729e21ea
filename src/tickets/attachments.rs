use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use log::info;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::schema::ticket_attachments;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::non_empty;
use crate::security::{policy, AuthenticatedUser};
use crate::tickets::storage::load_ticket;
use crate::tickets::types::{CreateAttachmentRequest, TicketAttachment};

/// Metadata only; the bytes live in external object storage.
pub fn validate_attachment(req: &CreateAttachmentRequest) -> ApiResult<()> {
    if req.file_name.trim().is_empty() {
        return Err(ApiError::Validation("file_name is required".to_string()));
    }
    if req.storage_path.trim().is_empty() {
        return Err(ApiError::Validation("storage_path is required".to_string()));
    }
    if req.storage_path.split('/').any(|part| part == "..") {
        return Err(ApiError::Validation(
            "storage_path must not contain '..'".to_string(),
        ));
    }
    if req.size_bytes < 0 {
        return Err(ApiError::Validation(
            "size_bytes cannot be negative".to_string(),
        ));
    }
    Ok(())
}

pub async fn handle_list_attachments(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(ticket_id): Path<Uuid>,
) -> ApiResult<Json<Vec<TicketAttachment>>> {
    let pool = state.conn.clone();

    let result = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        let loaded = load_ticket(&mut conn, ticket_id)?;
        if !policy::can_view_ticket(&user, &loaded.access()) {
            return Err(ApiError::NotFound("Ticket not found".to_string()));
        }
        ticket_attachments::table
            .filter(ticket_attachments::ticket_id.eq(ticket_id))
            .order(ticket_attachments::created_at.asc())
            .load::<TicketAttachment>(&mut conn)
            .map_err(ApiError::from)
    })
    .await??;

    Ok(Json(result))
}

pub async fn handle_create_attachment(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(ticket_id): Path<Uuid>,
    Json(req): Json<CreateAttachmentRequest>,
) -> ApiResult<(StatusCode, Json<TicketAttachment>)> {
    validate_attachment(&req)?;

    let attachment = TicketAttachment {
        id: Uuid::new_v4(),
        ticket_id,
        storage_path: req.storage_path.trim().to_string(),
        file_name: req.file_name.trim().to_string(),
        mime_type: non_empty(req.mime_type),
        size_bytes: req.size_bytes,
        uploaded_by: user.user_id,
        created_at: Utc::now(),
    };

    let pool = state.conn.clone();
    let attachment = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        let loaded = load_ticket(&mut conn, ticket_id)?;
        if !policy::can_view_ticket(&user, &loaded.access()) {
            return Err(ApiError::NotFound("Ticket not found".to_string()));
        }
        diesel::insert_into(ticket_attachments::table)
            .values(&attachment)
            .execute(&mut conn)?;
        Ok(attachment)
    })
    .await??;

    info!(
        "Attachment {} ({} bytes) added to ticket {ticket_id}",
        attachment.file_name, attachment.size_bytes
    );
    Ok((StatusCode::CREATED, Json(attachment)))
}

pub async fn handle_delete_attachment(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let pool = state.conn.clone();
    let user_id = user.user_id;

    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        let attachment = ticket_attachments::table
            .find(id)
            .first::<TicketAttachment>(&mut conn)
            .optional()?
            .ok_or_else(|| ApiError::NotFound("Attachment not found".to_string()))?;
        if !policy::can_delete_attachment(&user, attachment.uploaded_by) {
            return Err(ApiError::forbidden());
        }
        diesel::delete(ticket_attachments::table.find(id)).execute(&mut conn)?;
        Ok(())
    })
    .await??;

    info!("Attachment {id} deleted by {user_id}");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(path: &str, name: &str, size: i64) -> CreateAttachmentRequest {
        CreateAttachmentRequest {
            storage_path: path.to_string(),
            file_name: name.to_string(),
            mime_type: Some("image/png".to_string()),
            size_bytes: size,
        }
    }

    #[test]
    fn test_validate_attachment() {
        assert!(validate_attachment(&request("tickets/1/shot.png", "shot.png", 10)).is_ok());
        assert!(validate_attachment(&request("tickets/1/shot.png", " ", 10)).is_err());
        assert!(validate_attachment(&request("", "shot.png", 10)).is_err());
        assert!(validate_attachment(&request("tickets/../etc", "x", 10)).is_err());
        assert!(validate_attachment(&request("a/b", "x", -1)).is_err());
    }
}
