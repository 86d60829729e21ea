use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::schema::{profiles, tickets};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::non_empty;
use crate::security::{policy, AuthenticatedUser, Role};
use crate::tickets::storage::load_assignee_map;
use crate::tickets::types::{categorize, TicketCategory, TicketStatus};
use crate::users::ProfileSummary;

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub business: Option<String>,
}

/// The ticket fields a technician report needs.
#[derive(Debug, Clone)]
pub struct ReportTicket {
    pub status: TicketStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub assignees: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TechnicianReport {
    pub user_id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub assigned: i64,
    pub completed: i64,
    pub overdue: i64,
    pub avg_resolution_hours: Option<f64>,
}

pub fn build_technician_reports(
    technicians: &[ProfileSummary],
    tickets: &[ReportTicket],
    now: DateTime<Utc>,
) -> Vec<TechnicianReport> {
    technicians
        .iter()
        .map(|tech| {
            let mut report = TechnicianReport {
                user_id: tech.id,
                email: tech.email.clone(),
                full_name: tech.full_name.clone(),
                assigned: 0,
                completed: 0,
                overdue: 0,
                avg_resolution_hours: None,
            };
            let mut resolution_total = 0.0;
            let mut resolved = 0u32;

            for ticket in tickets.iter().filter(|t| t.assignees.contains(&tech.id)) {
                report.assigned += 1;
                match categorize(ticket.status, ticket.due_date, now) {
                    TicketCategory::Completed => {
                        report.completed += 1;
                        if let Some(done) = ticket.completed_at {
                            let secs = (done - ticket.created_at).num_seconds().max(0);
                            resolution_total += secs as f64 / 3600.0;
                            resolved += 1;
                        }
                    }
                    TicketCategory::Overdue if ticket.status != TicketStatus::Archived => {
                        report.overdue += 1
                    }
                    _ => {}
                }
            }

            if resolved > 0 {
                let avg = resolution_total / f64::from(resolved);
                report.avg_resolution_hours = Some((avg * 100.0).round() / 100.0);
            }
            report
        })
        .collect()
}

pub async fn handle_technician_report(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<ReportQuery>,
) -> ApiResult<Json<Vec<TechnicianReport>>> {
    if !policy::can_view_reports(&user) {
        return Err(ApiError::forbidden());
    }

    let pool = state.conn.clone();
    let reports = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;

        let technicians: Vec<ProfileSummary> = profiles::table
            .filter(profiles::role.eq(Role::TechnicianIt.as_str()))
            .filter(profiles::disabled.eq(false))
            .order(profiles::email.asc())
            .select((
                profiles::id,
                profiles::email,
                profiles::full_name,
                profiles::role,
            ))
            .load(&mut conn)?;

        let mut q = tickets::table
            .select((
                tickets::id,
                tickets::status,
                tickets::due_date,
                tickets::created_at,
                tickets::completed_at,
            ))
            .into_boxed();
        if let Some(from) = query.from {
            q = q.filter(tickets::created_at.ge(from));
        }
        if let Some(to) = query.to {
            q = q.filter(tickets::created_at.le(to));
        }
        if let Some(business) = non_empty(query.business) {
            q = q.filter(tickets::business.eq(business));
        }

        type Row = (
            Uuid,
            String,
            Option<DateTime<Utc>>,
            DateTime<Utc>,
            Option<DateTime<Utc>>,
        );
        let rows: Vec<Row> = q.load(&mut conn)?;
        let ids: Vec<Uuid> = rows.iter().map(|r| r.0).collect();
        let mut assignees = load_assignee_map(&mut conn, &ids)?;

        let report_tickets: Vec<ReportTicket> = rows
            .into_iter()
            .map(|(id, status, due_date, created_at, completed_at)| ReportTicket {
                status: status.parse().unwrap_or(TicketStatus::Open),
                due_date,
                created_at,
                completed_at,
                assignees: assignees.remove(&id).unwrap_or_default(),
            })
            .collect();

        Ok::<_, ApiError>(build_technician_reports(
            &technicians,
            &report_tickets,
            Utc::now(),
        ))
    })
    .await??;

    Ok(Json(reports))
}
