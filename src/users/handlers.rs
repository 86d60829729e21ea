use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use log::{info, warn};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::schema::profiles;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{contains_pattern, non_empty, normalize_email};
use crate::security::{policy, AuthenticatedUser, Role};
use crate::users::storage::{find_profile, find_profile_by_email};
use crate::users::types::{
    is_valid_email, CreateUserRequest, DisableUserRequest, ListUsersQuery, Profile,
    ProfileChanges, UpdateMeRequest, UpdateUserRequest,
};

fn require_manager(user: &AuthenticatedUser) -> ApiResult<()> {
    if policy::can_manage_users(user) {
        Ok(())
    } else {
        warn!("User {} attempted admin user management", user.user_id);
        Err(ApiError::forbidden())
    }
}

pub async fn handle_get_me(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> ApiResult<Json<Profile>> {
    let pool = state.conn.clone();
    let profile = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        find_profile(&mut conn, user.user_id)?
            .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))
    })
    .await??;

    Ok(Json(profile))
}

pub async fn handle_update_me(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<UpdateMeRequest>,
) -> ApiResult<Json<Profile>> {
    let pool = state.conn.clone();
    let changes = ProfileChanges {
        full_name: non_empty(req.full_name),
        avatar_url: non_empty(req.avatar_url),
        ext: non_empty(req.ext),
        updated_at: Some(Utc::now()),
        ..Default::default()
    };

    let profile = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        diesel::update(profiles::table.find(user.user_id))
            .set(&changes)
            .get_result::<Profile>(&mut conn)
            .map_err(ApiError::from)
    })
    .await??;

    Ok(Json(profile))
}

pub async fn handle_list_users(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<ListUsersQuery>,
) -> ApiResult<Json<Vec<Profile>>> {
    require_manager(&user)?;
    let pool = state.conn.clone();

    let result = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        let mut db_query = profiles::table.into_boxed();

        if let Some(role) = query.role {
            db_query = db_query.filter(profiles::role.eq(role.as_str()));
        }
        if let Some(disabled) = query.disabled {
            db_query = db_query.filter(profiles::disabled.eq(disabled));
        }
        if let Some(search) = non_empty(query.search) {
            let term = contains_pattern(&search);
            db_query = db_query.filter(
                profiles::email
                    .ilike(term.clone())
                    .or(profiles::full_name.ilike(term)),
            );
        }

        db_query
            .order(profiles::email.asc())
            .offset(query.offset.unwrap_or(0).max(0))
            .limit(query.limit.unwrap_or(100).clamp(1, 500))
            .load::<Profile>(&mut conn)
            .map_err(ApiError::from)
    })
    .await??;

    Ok(Json(result))
}

pub async fn handle_create_user(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<Json<Profile>> {
    require_manager(&user)?;

    let email = normalize_email(&req.email);
    if !is_valid_email(&email) {
        return Err(ApiError::Validation(format!("Invalid email: {}", req.email)));
    }

    let pool = state.conn.clone();
    let now = Utc::now();
    let new_profile = Profile {
        id: req.id.unwrap_or_else(Uuid::new_v4),
        email,
        full_name: non_empty(req.full_name),
        avatar_url: None,
        role: req.role.unwrap_or_default().as_str().to_string(),
        ext: non_empty(req.ext),
        can_create_ticket: req.can_create_ticket.unwrap_or(true),
        disabled: false,
        disabled_reason: None,
        created_at: now,
        updated_at: now,
    };

    let profile = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        if find_profile_by_email(&mut conn, &new_profile.email)?.is_some() {
            return Err(ApiError::Conflict(format!(
                "A profile with email {} already exists",
                new_profile.email
            )));
        }
        if find_profile(&mut conn, new_profile.id)?.is_some() {
            return Err(ApiError::Conflict(format!(
                "Profile {} already exists",
                new_profile.id
            )));
        }
        diesel::insert_into(profiles::table)
            .values(&new_profile)
            .get_result::<Profile>(&mut conn)
            .map_err(ApiError::from)
    })
    .await??;

    info!(
        "Manager {} created profile {} ({})",
        user.user_id, profile.id, profile.role
    );
    Ok(Json(profile))
}

pub async fn handle_update_user(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<Json<Profile>> {
    require_manager(&user)?;

    if id == user.user_id && req.role.is_some_and(|role| role != Role::Manager) {
        return Err(ApiError::Forbidden(
            "Managers cannot demote themselves".to_string(),
        ));
    }

    let pool = state.conn.clone();
    let changes = ProfileChanges {
        full_name: non_empty(req.full_name),
        role: req.role.map(|r| r.as_str().to_string()),
        ext: non_empty(req.ext),
        can_create_ticket: req.can_create_ticket,
        updated_at: Some(Utc::now()),
        ..Default::default()
    };

    let profile = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        diesel::update(profiles::table.find(id))
            .set(&changes)
            .get_result::<Profile>(&mut conn)
            .map_err(ApiError::from)
    })
    .await??;

    info!("Manager {} updated profile {}", user.user_id, profile.id);
    Ok(Json(profile))
}

pub async fn handle_disable_user(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    body: Option<Json<DisableUserRequest>>,
) -> ApiResult<Json<Profile>> {
    require_manager(&user)?;

    if id == user.user_id {
        return Err(ApiError::Forbidden(
            "Managers cannot disable their own account".to_string(),
        ));
    }

    let reason = body.and_then(|Json(req)| non_empty(req.reason));
    let profile = set_disabled(&state, id, true, reason).await?;

    info!("Manager {} disabled profile {}", user.user_id, id);
    Ok(Json(profile))
}

pub async fn handle_enable_user(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Profile>> {
    require_manager(&user)?;

    let profile = set_disabled(&state, id, false, None).await?;

    info!("Manager {} enabled profile {}", user.user_id, id);
    Ok(Json(profile))
}

async fn set_disabled(
    state: &AppState,
    id: Uuid,
    disabled: bool,
    reason: Option<String>,
) -> ApiResult<Profile> {
    let pool = state.conn.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        diesel::update(profiles::table.find(id))
            .set((
                profiles::disabled.eq(disabled),
                profiles::disabled_reason.eq(reason),
                profiles::updated_at.eq(Utc::now()),
            ))
            .get_result::<Profile>(&mut conn)
            .map_err(ApiError::from)
    })
    .await?
}
