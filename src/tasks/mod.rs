//! Recurring daily checklists and weekly compliance.

pub mod compliance;
pub mod handlers;
pub mod types;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;

pub use handlers::*;
pub use types::{DayStatus, TaskCheck, TaskDefinition};

pub fn configure_task_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            ApiUrls::TASKS,
            get(handle_list_tasks).post(handle_create_task),
        )
        .route(ApiUrls::TASKS_TODAY, get(handle_today_checklist))
        .route(ApiUrls::TASKS_COMPLIANCE, get(handle_compliance))
        .route(
            ApiUrls::TASKS_CUTOFF,
            get(handle_get_cutoff).put(handle_set_cutoff),
        )
        .route(
            ApiUrls::TASK_BY_ID,
            put(handle_update_task).delete(handle_deactivate_task),
        )
        .route(
            ApiUrls::TASK_CHECK,
            post(handle_check_task).delete(handle_uncheck_task),
        )
}
