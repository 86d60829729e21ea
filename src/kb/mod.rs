//! Knowledge base articles addressed by slug.

pub mod handlers;
pub mod slug;
pub mod types;

use axum::{routing::get, Router};
use std::sync::Arc;

use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;

pub use handlers::*;
pub use types::{ArticleStatus, KbArticle};

/// `GET` on an article key looks it up by slug; `PUT` and `DELETE` take the
/// article id.
pub fn configure_kb_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            ApiUrls::KB_ARTICLES,
            get(handle_list_articles).post(handle_create_article),
        )
        .route(
            ApiUrls::KB_ARTICLE,
            get(handle_get_article)
                .put(handle_update_article)
                .delete(handle_delete_article),
        )
}
