pub mod handlers;
pub mod storage;
pub mod types;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;

pub use handlers::*;
pub use types::{Profile, ProfileSummary};

pub fn configure_users_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::ME, get(handle_get_me).put(handle_update_me))
        .route(
            ApiUrls::ADMIN_USERS,
            get(handle_list_users).post(handle_create_user),
        )
        .route(ApiUrls::ADMIN_USER_BY_ID, put(handle_update_user))
        .route(ApiUrls::ADMIN_USER_DISABLE, post(handle_disable_user))
        .route(ApiUrls::ADMIN_USER_ENABLE, post(handle_enable_user))
}
