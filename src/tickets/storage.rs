use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use std::collections::HashMap;
use uuid::Uuid;

use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::schema::{ticket_assignees, tickets};
use crate::core::shared::utils::{contains_pattern, non_empty, normalize_email};
use crate::security::policy::TicketAccess;
use crate::security::{AuthenticatedUser, Role};
use crate::tickets::types::{
    ListTicketsQuery, StatsQuery, Ticket, TicketCategory, TicketStats, TicketStatus,
};

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;

/// A ticket together with its ordered assignee list.
#[derive(Debug, Clone)]
pub struct LoadedTicket {
    pub ticket: Ticket,
    pub assignees: Vec<Uuid>,
}

impl LoadedTicket {
    pub fn access(&self) -> TicketAccess<'_> {
        TicketAccess {
            created_by: self.ticket.created_by,
            assigned_to: self.ticket.assigned_to,
            assignees: &self.assignees,
            requester_email: self.ticket.requester_email.as_deref(),
        }
    }
}

pub fn load_ticket(conn: &mut PgConnection, id: Uuid) -> ApiResult<LoadedTicket> {
    let ticket = tickets::table
        .find(id)
        .first::<Ticket>(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("Ticket not found".to_string()))?;
    let assignees = load_assignees(conn, id)?;
    Ok(LoadedTicket { ticket, assignees })
}

pub fn load_assignees(conn: &mut PgConnection, ticket_id: Uuid) -> QueryResult<Vec<Uuid>> {
    ticket_assignees::table
        .filter(ticket_assignees::ticket_id.eq(ticket_id))
        .order(ticket_assignees::assigned_at.asc())
        .select(ticket_assignees::user_id)
        .load(conn)
}

pub fn load_assignee_map(
    conn: &mut PgConnection,
    ticket_ids: &[Uuid],
) -> QueryResult<HashMap<Uuid, Vec<Uuid>>> {
    let mut map: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    if ticket_ids.is_empty() {
        return Ok(map);
    }
    let rows: Vec<(Uuid, Uuid)> = ticket_assignees::table
        .filter(ticket_assignees::ticket_id.eq_any(ticket_ids))
        .order(ticket_assignees::assigned_at.asc())
        .select((ticket_assignees::ticket_id, ticket_assignees::user_id))
        .load(conn)?;
    for (ticket_id, user_id) in rows {
        map.entry(ticket_id).or_default().push(user_id);
    }
    Ok(map)
}

/// Replaces the assignee set, keeping request order, and mirrors the first
/// assignee into `tickets.assigned_to`.
pub fn replace_assignees(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    assignees: &[Uuid],
) -> QueryResult<()> {
    let mut unique: Vec<Uuid> = Vec::with_capacity(assignees.len());
    for id in assignees {
        if !unique.contains(id) {
            unique.push(*id);
        }
    }

    conn.transaction(|conn| {
        diesel::delete(ticket_assignees::table.filter(ticket_assignees::ticket_id.eq(ticket_id)))
            .execute(conn)?;

        let now = Utc::now();
        let rows: Vec<_> = unique
            .iter()
            .enumerate()
            .map(|(i, user_id)| {
                (
                    ticket_assignees::ticket_id.eq(ticket_id),
                    ticket_assignees::user_id.eq(*user_id),
                    ticket_assignees::assigned_at.eq(now + Duration::microseconds(i as i64)),
                )
            })
            .collect();
        if !rows.is_empty() {
            diesel::insert_into(ticket_assignees::table)
                .values(rows)
                .execute(conn)?;
        }

        diesel::update(tickets::table.find(ticket_id))
            .set((
                tickets::assigned_to.eq(unique.first().copied()),
                tickets::updated_at.eq(now),
            ))
            .execute(conn)?;
        Ok(())
    })
}

pub fn list_tickets(
    conn: &mut PgConnection,
    user: &AuthenticatedUser,
    query: ListTicketsQuery,
    now: DateTime<Utc>,
) -> QueryResult<Vec<Ticket>> {
    let mut q = tickets::table.into_boxed();

    if user.role == Role::UserClient {
        q = q.filter(
            tickets::created_by
                .eq(user.user_id)
                .or(tickets::requester_email.eq(normalize_email(&user.email))),
        );
    }

    match query.status {
        Some(status) => q = q.filter(tickets::status.eq(status.as_str())),
        None if !query.include_archived.unwrap_or(false) => {
            q = q.filter(tickets::status.ne(TicketStatus::Archived.as_str()))
        }
        None => {}
    }

    if let Some(category) = query.category {
        let completed = TicketStatus::Completed.as_str();
        let not_overdue = tickets::due_date
            .is_null()
            .or(tickets::due_date.assume_not_null().ge(now));
        q = match category {
            TicketCategory::Completed => q.filter(tickets::status.eq(completed)),
            TicketCategory::Overdue => q.filter(
                tickets::status
                    .ne(completed)
                    .and(tickets::due_date.assume_not_null().lt(now)),
            ),
            TicketCategory::New => q.filter(
                tickets::status
                    .eq(TicketStatus::Open.as_str())
                    .and(not_overdue),
            ),
            TicketCategory::Pending => q.filter(
                tickets::status
                    .ne_all(vec![TicketStatus::Open.as_str(), completed])
                    .and(not_overdue),
            ),
        };
    }

    if let Some(priority) = query.priority {
        q = q.filter(tickets::priority.eq(priority.as_str()));
    }

    if let Some(business) = non_empty(query.business) {
        q = q.filter(tickets::business.eq(business));
    }

    if let Some(assignee) = query.assignee {
        q = q.filter(
            tickets::id.eq_any(
                ticket_assignees::table
                    .filter(ticket_assignees::user_id.eq(assignee))
                    .select(ticket_assignees::ticket_id),
            ),
        );
    }

    if let Some(search) = non_empty(query.search) {
        let pattern = contains_pattern(&search);
        q = q.filter(
            tickets::title
                .ilike(pattern.clone())
                .or(tickets::description.ilike(pattern.clone()))
                .or(tickets::requester_email.ilike(pattern)),
        );
    }

    q.order(tickets::created_at.desc())
        .limit(query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE))
        .offset(query.offset.unwrap_or(0).max(0))
        .load(conn)
}

pub fn ticket_stats(
    conn: &mut PgConnection,
    user: &AuthenticatedUser,
    query: StatsQuery,
    now: DateTime<Utc>,
) -> QueryResult<TicketStats> {
    let mut q = tickets::table
        .select((tickets::status, tickets::priority, tickets::due_date))
        .into_boxed();

    if user.role == Role::UserClient {
        q = q.filter(
            tickets::created_by
                .eq(user.user_id)
                .or(tickets::requester_email.eq(normalize_email(&user.email))),
        );
    }
    if let Some(business) = non_empty(query.business) {
        q = q.filter(tickets::business.eq(business));
    }
    if let Some(from) = query.from {
        q = q.filter(tickets::created_at.ge(from));
    }
    if let Some(to) = query.to {
        q = q.filter(tickets::created_at.le(to));
    }

    let rows: Vec<(String, String, Option<DateTime<Utc>>)> = q.load(conn)?;
    Ok(TicketStats::compute(
        rows.iter()
            .map(|(status, priority, due)| (status.as_str(), priority.as_str(), *due)),
        now,
    ))
}
