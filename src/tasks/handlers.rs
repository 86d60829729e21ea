use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use diesel::prelude::*;
use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::config::{parse_cutoff, TasksConfig};
use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::schema::{app_settings, task_checks, task_definitions};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::non_empty;
use crate::security::{policy, AuthenticatedUser};
use crate::tasks::compliance::{
    compliance_report, day_status, is_active_on, validate_range, week_start,
};
use crate::tasks::types::{
    validate_weekdays, CheckDateQuery, CheckTaskRequest, ChecklistItem, ComplianceQuery,
    ComplianceReport, CreateTaskRequest, CutoffSetting, ListTasksQuery, SetCutoffRequest,
    TaskChanges, TaskCheck, TaskDefinition, TodayQuery, UpdateTaskRequest, DEFAULT_WEEKDAYS,
};
use crate::users::storage::find_profile;

pub const CUTOFF_SETTING_KEY: &str = "task_cutoff_time";

fn fallback_cutoff() -> NaiveTime {
    NaiveTime::from_hms_opt(10, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// Stored setting first, then the configured default.
fn current_cutoff(conn: &mut PgConnection, config: &TasksConfig) -> QueryResult<NaiveTime> {
    let stored: Option<String> = app_settings::table
        .find(CUTOFF_SETTING_KEY)
        .select(app_settings::value)
        .first(conn)
        .optional()?;

    Ok(stored
        .as_deref()
        .and_then(|value| {
            let parsed = parse_cutoff(value);
            if parsed.is_none() {
                warn!("Ignoring malformed {CUTOFF_SETTING_KEY} setting {value:?}");
            }
            parsed
        })
        .or_else(|| config.cutoff())
        .unwrap_or_else(fallback_cutoff))
}

fn local_now(config: &TasksConfig) -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&config.offset())
}

fn require_manager(user: &AuthenticatedUser) -> ApiResult<()> {
    if policy::can_manage_tasks(user) {
        Ok(())
    } else {
        warn!("User {} is not allowed to manage tasks", user.user_id);
        Err(ApiError::forbidden())
    }
}

fn load_task(conn: &mut PgConnection, id: Uuid) -> ApiResult<TaskDefinition> {
    task_definitions::table
        .find(id)
        .first::<TaskDefinition>(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound(format!("Task {id} not found")))
}

fn ensure_assignee(conn: &mut PgConnection, id: Uuid) -> ApiResult<()> {
    match find_profile(conn, id)? {
        Some(profile) if !profile.disabled => Ok(()),
        _ => Err(ApiError::Validation(format!("Unknown assignee {id}"))),
    }
}

pub async fn handle_list_tasks(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<ListTasksQuery>,
) -> ApiResult<Json<Vec<TaskDefinition>>> {
    let assignee = if policy::can_manage_tasks(&user) {
        query.assignee
    } else {
        Some(user.user_id)
    };

    let pool = state.conn.clone();
    let tasks = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        let mut q = task_definitions::table.into_boxed();
        if let Some(assignee) = assignee {
            q = q.filter(task_definitions::assignee_id.eq(assignee));
        }
        if !query.include_inactive {
            q = q.filter(task_definitions::active.eq(true));
        }
        q.order((task_definitions::assignee_id, task_definitions::title))
            .load::<TaskDefinition>(&mut conn)
            .map_err(ApiError::from)
    })
    .await??;

    Ok(Json(tasks))
}

pub async fn handle_create_task(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<TaskDefinition>)> {
    require_manager(&user)?;

    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::Validation("Title is required".to_string()));
    }
    let weekdays = validate_weekdays(req.weekdays.unwrap_or_else(|| DEFAULT_WEEKDAYS.to_vec()))
        .map_err(ApiError::Validation)?;

    let now = Utc::now();
    let task = TaskDefinition {
        id: Uuid::new_v4(),
        title,
        description: non_empty(req.description),
        assignee_id: req.assignee_id,
        weekdays,
        active: true,
        created_by: user.user_id,
        created_at: now,
        updated_at: now,
    };

    let pool = state.conn.clone();
    let task = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        ensure_assignee(&mut conn, task.assignee_id)?;
        diesel::insert_into(task_definitions::table)
            .values(&task)
            .get_result::<TaskDefinition>(&mut conn)
            .map_err(ApiError::from)
    })
    .await??;

    info!(
        "Manager {} created task {} for {}",
        user.user_id, task.id, task.assignee_id
    );
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn handle_update_task(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTaskRequest>,
) -> ApiResult<Json<TaskDefinition>> {
    require_manager(&user)?;

    let title = match req.title {
        Some(t) if t.trim().is_empty() => {
            return Err(ApiError::Validation("Title cannot be empty".to_string()))
        }
        Some(t) => Some(t.trim().to_string()),
        None => None,
    };
    let weekdays = req
        .weekdays
        .map(validate_weekdays)
        .transpose()
        .map_err(ApiError::Validation)?;

    let changes = TaskChanges {
        title,
        description: req.description,
        assignee_id: req.assignee_id,
        weekdays,
        active: req.active,
        updated_at: Some(Utc::now()),
    };

    let pool = state.conn.clone();
    let task = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        load_task(&mut conn, id)?;
        if let Some(assignee) = changes.assignee_id {
            ensure_assignee(&mut conn, assignee)?;
        }
        diesel::update(task_definitions::table.find(id))
            .set(&changes)
            .get_result::<TaskDefinition>(&mut conn)
            .map_err(ApiError::from)
    })
    .await??;

    info!("Manager {} updated task {}", user.user_id, task.id);
    Ok(Json(task))
}

/// Definitions are deactivated rather than deleted so past check-ins keep
/// their task.
pub async fn handle_deactivate_task(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    require_manager(&user)?;

    let pool = state.conn.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        load_task(&mut conn, id)?;
        diesel::update(task_definitions::table.find(id))
            .set((
                task_definitions::active.eq(false),
                task_definitions::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;
        Ok::<_, ApiError>(())
    })
    .await??;

    info!("Manager {} deactivated task {}", user.user_id, id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn handle_today_checklist(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<TodayQuery>,
) -> ApiResult<Json<Vec<ChecklistItem>>> {
    let owner = query.user_id.unwrap_or(user.user_id);
    if !policy::can_view_user_tasks(&user, owner) {
        return Err(ApiError::forbidden());
    }

    let config = state.config.tasks.clone();
    let pool = state.conn.clone();
    let items = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        let cutoff = current_cutoff(&mut conn, &config)?;
        let now = local_now(&config);
        let today = now.date_naive();

        let tasks: Vec<TaskDefinition> = task_definitions::table
            .filter(task_definitions::assignee_id.eq(owner))
            .filter(task_definitions::active.eq(true))
            .order(task_definitions::title)
            .load(&mut conn)?;
        let ids: Vec<Uuid> = tasks.iter().map(|t| t.id).collect();

        let mut checks: HashMap<Uuid, TaskCheck> = task_checks::table
            .filter(task_checks::task_id.eq_any(&ids))
            .filter(task_checks::user_id.eq(owner))
            .filter(task_checks::check_date.eq(today))
            .load::<TaskCheck>(&mut conn)?
            .into_iter()
            .map(|c| (c.task_id, c))
            .collect();

        Ok::<_, ApiError>(
            tasks
                .into_iter()
                .map(|task| {
                    let check = checks.remove(&task.id);
                    let done = check.as_ref().is_some_and(|c| c.completed_at.is_some());
                    ChecklistItem {
                        status: day_status(&task.weekdays, today, done, now, cutoff),
                        date: today,
                        completed_at: check.as_ref().and_then(|c| c.completed_at),
                        note: check.and_then(|c| c.note),
                        task,
                    }
                })
                .collect(),
        )
    })
    .await??;

    Ok(Json(items))
}

/// Loads the task and checks the actor may record `date` for it.
fn checkable_task(
    conn: &mut PgConnection,
    user: &AuthenticatedUser,
    id: Uuid,
    date: NaiveDate,
    today: NaiveDate,
) -> ApiResult<TaskDefinition> {
    let task = load_task(conn, id)?;
    if !policy::can_check_task(user, task.assignee_id) {
        return Err(ApiError::Forbidden(
            "Only the assignee can check this task".to_string(),
        ));
    }
    if !task.active {
        return Err(ApiError::Validation(format!("Task {id} is inactive")));
    }
    if date > today {
        return Err(ApiError::Validation(
            "Cannot check a task for a future date".to_string(),
        ));
    }
    if !is_active_on(&task.weekdays, date) {
        return Err(ApiError::Validation(format!(
            "Task {id} is not scheduled on {date}"
        )));
    }
    Ok(task)
}

pub async fn handle_check_task(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    body: Option<Json<CheckTaskRequest>>,
) -> ApiResult<Json<TaskCheck>> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let today = local_now(&state.config.tasks).date_naive();
    let date = req.date.unwrap_or(today);
    let note = non_empty(req.note);

    let pool = state.conn.clone();
    let actor = user.clone();
    let check = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        checkable_task(&mut conn, &actor, id, date, today)?;

        let now = Utc::now();
        let row = TaskCheck {
            id: Uuid::new_v4(),
            task_id: id,
            user_id: actor.user_id,
            check_date: date,
            completed_at: Some(now),
            note: note.clone(),
        };
        diesel::insert_into(task_checks::table)
            .values(&row)
            .on_conflict((
                task_checks::task_id,
                task_checks::user_id,
                task_checks::check_date,
            ))
            .do_update()
            .set((
                task_checks::completed_at.eq(Some(now)),
                task_checks::note.eq(note),
            ))
            .get_result::<TaskCheck>(&mut conn)
            .map_err(ApiError::from)
    })
    .await??;

    info!("User {} checked task {} for {}", user.user_id, id, date);
    Ok(Json(check))
}

pub async fn handle_uncheck_task(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Query(query): Query<CheckDateQuery>,
) -> ApiResult<StatusCode> {
    let today = local_now(&state.config.tasks).date_naive();
    let date = query.date.unwrap_or(today);

    let pool = state.conn.clone();
    let actor = user.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        checkable_task(&mut conn, &actor, id, date, today)?;
        diesel::delete(
            task_checks::table
                .filter(task_checks::task_id.eq(id))
                .filter(task_checks::user_id.eq(actor.user_id))
                .filter(task_checks::check_date.eq(date)),
        )
        .execute(&mut conn)?;
        Ok::<_, ApiError>(())
    })
    .await??;

    info!("User {} unchecked task {} for {}", user.user_id, id, date);
    Ok(StatusCode::NO_CONTENT)
}

/// Defaults to Monday of the current local week through today. Managers
/// without a `user_id` get one report per user with active tasks.
pub async fn handle_compliance(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<ComplianceQuery>,
) -> ApiResult<Json<Vec<ComplianceReport>>> {
    let today = local_now(&state.config.tasks).date_naive();
    let to = query.to.unwrap_or(today);
    let from = query.from.unwrap_or_else(|| week_start(to));
    validate_range(from, to).map_err(ApiError::Validation)?;

    let target = match query.user_id {
        Some(owner) if !policy::can_view_user_tasks(&user, owner) => {
            return Err(ApiError::forbidden())
        }
        Some(owner) => Some(owner),
        None if policy::can_manage_tasks(&user) => None,
        None => Some(user.user_id),
    };

    let pool = state.conn.clone();
    let reports = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;

        let mut q = task_definitions::table
            .filter(task_definitions::active.eq(true))
            .into_boxed();
        if let Some(owner) = target {
            q = q.filter(task_definitions::assignee_id.eq(owner));
        }
        let tasks: Vec<TaskDefinition> = q
            .order((task_definitions::assignee_id, task_definitions::title))
            .load(&mut conn)?;
        let ids: Vec<Uuid> = tasks.iter().map(|t| t.id).collect();

        let checks: Vec<TaskCheck> = task_checks::table
            .filter(task_checks::task_id.eq_any(&ids))
            .filter(task_checks::check_date.between(from, to))
            .filter(task_checks::completed_at.is_not_null())
            .load(&mut conn)?;

        let mut users: Vec<Uuid> = match target {
            Some(owner) => vec![owner],
            None => tasks.iter().map(|t| t.assignee_id).collect(),
        };
        users.dedup();

        Ok::<_, ApiError>(
            users
                .into_iter()
                .map(|owner| compliance_report(owner, &tasks, &checks, from, to))
                .collect(),
        )
    })
    .await??;

    Ok(Json(reports))
}

pub async fn handle_get_cutoff(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
) -> ApiResult<Json<CutoffSetting>> {
    let config = state.config.tasks.clone();
    let pool = state.conn.clone();
    let cutoff = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        current_cutoff(&mut conn, &config).map_err(ApiError::from)
    })
    .await??;

    Ok(Json(CutoffSetting {
        cutoff: cutoff.format("%H:%M").to_string(),
        utc_offset_minutes: state.config.tasks.utc_offset_minutes,
    }))
}

pub async fn handle_set_cutoff(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<SetCutoffRequest>,
) -> ApiResult<Json<CutoffSetting>> {
    require_manager(&user)?;

    let cutoff = parse_cutoff(&req.cutoff).ok_or_else(|| {
        ApiError::Validation(format!("Invalid cutoff time {:?}; expected HH:MM", req.cutoff))
    })?;
    let value = cutoff.format("%H:%M").to_string();

    let pool = state.conn.clone();
    let stored = value.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        let now = Utc::now();
        diesel::insert_into(app_settings::table)
            .values((
                app_settings::key.eq(CUTOFF_SETTING_KEY),
                app_settings::value.eq(&stored),
                app_settings::updated_at.eq(now),
            ))
            .on_conflict(app_settings::key)
            .do_update()
            .set((
                app_settings::value.eq(&stored),
                app_settings::updated_at.eq(now),
            ))
            .execute(&mut conn)?;
        Ok::<_, ApiError>(())
    })
    .await??;

    info!("Manager {} set the task cutoff to {value}", user.user_id);
    Ok(Json(CutoffSetting {
        cutoff: value,
        utc_offset_minutes: state.config.tasks.utc_offset_minutes,
    }))
}
