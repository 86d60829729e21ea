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
use crate::core::shared::schema::kb_articles;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{contains_pattern, non_empty};
use crate::kb::slug::{slugify, unique_slug};
use crate::kb::types::{
    normalize_tags, ArticleChanges, ArticleStatus, CreateArticleRequest, KbArticle,
    ListArticlesQuery, UpdateArticleRequest,
};
use crate::security::{policy, AuthenticatedUser};

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

fn parse_article_id(key: &str) -> ApiResult<Uuid> {
    key.parse()
        .map_err(|_| ApiError::Validation(format!("Invalid article id: {key}")))
}

/// Slugs starting with `base`, optionally ignoring one article.
fn slugs_like(
    conn: &mut PgConnection,
    base: &str,
    exclude: Option<Uuid>,
) -> QueryResult<Vec<String>> {
    let mut q = kb_articles::table
        .filter(kb_articles::slug.like(format!("{base}%")))
        .select(kb_articles::slug)
        .into_boxed();
    if let Some(id) = exclude {
        q = q.filter(kb_articles::id.ne(id));
    }
    q.load(conn)
}

fn load_article(conn: &mut PgConnection, id: Uuid) -> ApiResult<KbArticle> {
    kb_articles::table
        .find(id)
        .first::<KbArticle>(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound(format!("Article {id} not found")))
}

pub async fn handle_list_articles(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<ListArticlesQuery>,
) -> ApiResult<Json<Vec<KbArticle>>> {
    // Non-staff only ever see published articles.
    let status = if user.is_staff() {
        query.status
    } else {
        Some(ArticleStatus::Published)
    };

    let pool = state.conn.clone();
    let articles = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        let mut q = kb_articles::table.into_boxed();

        if let Some(status) = status {
            q = q.filter(kb_articles::status.eq(status.as_str()));
        }
        if let Some(tag) = non_empty(query.tag) {
            q = q.filter(kb_articles::tags.contains(vec![tag.to_lowercase()]));
        }
        if let Some(search) = non_empty(query.search) {
            let pattern = contains_pattern(&search);
            q = q.filter(
                kb_articles::title
                    .ilike(pattern.clone())
                    .or(kb_articles::summary.assume_not_null().ilike(pattern)),
            );
        }

        let limit = query
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        q.order(kb_articles::updated_at.desc())
            .limit(limit)
            .offset(query.offset.unwrap_or(0).max(0))
            .load::<KbArticle>(&mut conn)
            .map_err(ApiError::from)
    })
    .await??;

    Ok(Json(articles))
}

/// Published articles count a view on every read.
pub async fn handle_get_article(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(slug): Path<String>,
) -> ApiResult<Json<KbArticle>> {
    let pool = state.conn.clone();
    let article = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        let article = kb_articles::table
            .filter(kb_articles::slug.eq(&slug))
            .first::<KbArticle>(&mut conn)
            .optional()?
            .filter(|a| policy::can_read_article(&user, a.is_published()))
            .ok_or_else(|| ApiError::NotFound(format!("Article {slug} not found")))?;

        if !article.is_published() {
            return Ok(article);
        }
        diesel::update(kb_articles::table.find(article.id))
            .set(kb_articles::views.eq(kb_articles::views + 1))
            .get_result::<KbArticle>(&mut conn)
            .map_err(ApiError::from)
    })
    .await??;

    Ok(Json(article))
}

pub async fn handle_create_article(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<CreateArticleRequest>,
) -> ApiResult<(StatusCode, Json<KbArticle>)> {
    if !policy::can_write_articles(&user) {
        warn!("User {} tried to write an article", user.user_id);
        return Err(ApiError::forbidden());
    }

    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::Validation("Title is required".to_string()));
    }

    let now = Utc::now();
    let mut article = KbArticle {
        id: Uuid::new_v4(),
        slug: slugify(&title),
        title,
        summary: non_empty(req.summary),
        content: req.content,
        status: req.status.unwrap_or_default().as_str().to_string(),
        tags: normalize_tags(req.tags),
        views: 0,
        created_by: user.user_id,
        created_at: now,
        updated_at: now,
    };

    let pool = state.conn.clone();
    let article = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        let taken = slugs_like(&mut conn, &article.slug, None)?;
        article.slug = unique_slug(&article.slug, &taken);
        diesel::insert_into(kb_articles::table)
            .values(&article)
            .get_result::<KbArticle>(&mut conn)
            .map_err(ApiError::from)
    })
    .await??;

    info!(
        "User {} created article {} ({})",
        user.user_id, article.id, article.slug
    );
    Ok((StatusCode::CREATED, Json(article)))
}

/// The slug only changes when `regenerate_slug` is set.
pub async fn handle_update_article(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(key): Path<String>,
    Json(req): Json<UpdateArticleRequest>,
) -> ApiResult<Json<KbArticle>> {
    if !policy::can_write_articles(&user) {
        return Err(ApiError::forbidden());
    }
    let id = parse_article_id(&key)?;

    let title = match req.title {
        Some(t) if t.trim().is_empty() => {
            return Err(ApiError::Validation("Title cannot be empty".to_string()))
        }
        Some(t) => Some(t.trim().to_string()),
        None => None,
    };

    let pool = state.conn.clone();
    let article = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        let current = load_article(&mut conn, id)?;

        let slug = if req.regenerate_slug {
            let base = slugify(title.as_deref().unwrap_or(&current.title));
            let taken = slugs_like(&mut conn, &base, Some(id))?;
            Some(unique_slug(&base, &taken))
        } else {
            None
        };

        let changes = ArticleChanges {
            slug,
            title,
            summary: req.summary,
            content: req.content,
            status: req.status.map(|s| s.as_str().to_string()),
            tags: req.tags.map(normalize_tags),
            updated_at: Some(Utc::now()),
        };

        diesel::update(kb_articles::table.find(id))
            .set(&changes)
            .get_result::<KbArticle>(&mut conn)
            .map_err(ApiError::from)
    })
    .await??;

    info!("User {} updated article {}", user.user_id, article.id);
    Ok(Json(article))
}

pub async fn handle_delete_article(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(key): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_article_id(&key)?;

    let pool = state.conn.clone();
    let actor = user.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        let article = load_article(&mut conn, id)?;
        if !policy::can_delete_article(&actor, article.created_by) {
            return Err(ApiError::forbidden());
        }
        diesel::delete(kb_articles::table.find(id)).execute(&mut conn)?;
        Ok(())
    })
    .await??;

    info!("User {} deleted article {}", user.user_id, id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_article_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_article_id(&id.to_string()).unwrap(), id);
        assert!(matches!(
            parse_article_id("reset-vpn-token"),
            Err(ApiError::Validation(_))
        ));
    }
}
