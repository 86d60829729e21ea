pub mod attachments;
pub mod comments;
pub mod handlers;
pub mod reports;
pub mod storage;
pub mod types;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;

use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;

pub use attachments::*;
pub use comments::*;
pub use handlers::*;
pub use reports::handle_technician_report;
pub use types::{categorize, StatusAction, Ticket, TicketCategory, TicketStatus};

pub fn configure_tickets_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            ApiUrls::TICKETS,
            get(handle_list_tickets).post(handle_create_ticket),
        )
        .route(ApiUrls::TICKET_STATS, get(handle_ticket_stats))
        .route(
            ApiUrls::TICKET_BY_ID,
            get(handle_get_ticket).put(handle_update_ticket),
        )
        .route(ApiUrls::TICKET_START, post(handle_start_ticket))
        .route(ApiUrls::TICKET_HOLD, post(handle_hold_ticket))
        .route(ApiUrls::TICKET_COMPLETE, post(handle_complete_ticket))
        .route(ApiUrls::TICKET_REACTIVATE, post(handle_reactivate_ticket))
        .route(ApiUrls::TICKET_ARCHIVE, post(handle_archive_ticket))
        .route(ApiUrls::TICKET_TAKE, post(handle_take_ticket))
        .route(ApiUrls::TICKET_ASSIGNEES, put(handle_set_assignees))
        .route(
            ApiUrls::TICKET_COMMENTS,
            get(handle_list_comments).post(handle_create_comment),
        )
        .route(ApiUrls::COMMENT_BY_ID, delete(handle_delete_comment))
        .route(
            ApiUrls::TICKET_ATTACHMENTS,
            get(handle_list_attachments).post(handle_create_attachment),
        )
        .route(ApiUrls::ATTACHMENT_BY_ID, delete(handle_delete_attachment))
        .route(ApiUrls::REPORT_TECHNICIANS, get(handle_technician_report))
}
