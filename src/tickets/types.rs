use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::core::shared::schema::{ticket_attachments, ticket_comments, tickets};
use crate::users::ProfileSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    OnHold,
    Completed,
    Archived,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 5] = [
        Self::Open,
        Self::InProgress,
        Self::OnHold,
        Self::Completed,
        Self::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::OnHold => "on_hold",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Unknown ticket status: {s}"))
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Self::Low, Self::Normal, Self::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketSource {
    App,
    Email,
}

impl TicketSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Email => "email",
        }
    }
}

/// Display grouping derived from status and due date. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketCategory {
    New,
    Pending,
    Overdue,
    Completed,
}

impl TicketCategory {
    pub const ALL: [TicketCategory; 4] = [Self::New, Self::Pending, Self::Overdue, Self::Completed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Pending => "pending",
            Self::Overdue => "overdue",
            Self::Completed => "completed",
        }
    }
}

pub fn categorize(
    status: TicketStatus,
    due_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> TicketCategory {
    if status == TicketStatus::Completed {
        return TicketCategory::Completed;
    }
    if due_date.is_some_and(|due| due < now) {
        return TicketCategory::Overdue;
    }
    if status == TicketStatus::Open {
        TicketCategory::New
    } else {
        TicketCategory::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAction {
    Start,
    Hold,
    Complete,
    Reactivate,
    Archive,
}

impl StatusAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Hold => "hold",
            Self::Complete => "complete",
            Self::Reactivate => "reactivate",
            Self::Archive => "archive",
        }
    }

    pub fn target(&self) -> TicketStatus {
        match self {
            Self::Start => TicketStatus::InProgress,
            Self::Hold => TicketStatus::OnHold,
            Self::Complete => TicketStatus::Completed,
            Self::Reactivate => TicketStatus::Open,
            Self::Archive => TicketStatus::Archived,
        }
    }

    pub fn allowed_from(&self, from: TicketStatus) -> bool {
        use TicketStatus::*;
        match self {
            Self::Start => matches!(from, Open | OnHold),
            Self::Hold => from == InProgress,
            Self::Complete => matches!(from, Open | InProgress | OnHold),
            Self::Reactivate => matches!(from, Completed | Archived),
            Self::Archive => from != Archived,
        }
    }

    pub fn apply(&self, from: TicketStatus) -> Result<TicketStatus, String> {
        if self.allowed_from(from) {
            Ok(self.target())
        } else {
            Err(format!("Cannot {} a ticket that is {}", self.as_str(), from))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = tickets)]
pub struct Ticket {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub created_by: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub business: Option<String>,
    pub source: String,
    pub requester_email: Option<String>,
    pub requester_name: Option<String>,
    pub message_id: Option<String>,
}

impl Ticket {
    /// Unknown values read as `open` so a bad row never hides a ticket.
    pub fn status(&self) -> TicketStatus {
        self.status.parse().unwrap_or(TicketStatus::Open)
    }

    pub fn category(&self, now: DateTime<Utc>) -> TicketCategory {
        categorize(self.status(), self.due_date, now)
    }

    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = tickets)]
pub struct TicketChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub priority: Option<String>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub business: Option<Option<String>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketView {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub category: TicketCategory,
    pub assignees: Vec<Uuid>,
}

impl TicketView {
    pub fn new(ticket: Ticket, assignees: Vec<Uuid>, now: DateTime<Utc>) -> Self {
        let category = ticket.category(now);
        Self {
            ticket,
            category,
            assignees,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketDetail {
    #[serde(flatten)]
    pub ticket: TicketView,
    pub assignee_profiles: Vec<ProfileSummary>,
    pub comments: Vec<CommentView>,
    pub attachments: Vec<TicketAttachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = ticket_comments)]
pub struct TicketComment {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: TicketComment,
    pub author: Option<ProfileSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = ticket_attachments)]
pub struct TicketAttachment {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub storage_path: String,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub size_bytes: i64,
    pub uploaded_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Distinguishes an absent field from an explicit `null`.
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<DateTime<Utc>>,
    pub business: Option<String>,
    pub requester_email: Option<String>,
    pub requester_name: Option<String>,
    /// Honoured for managers only.
    #[serde(default)]
    pub assignees: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTicketRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub business: Option<Option<String>>,
}

/// Trims a nullable text update; blank text clears the column like `null`.
pub fn clearable_text(value: Option<Option<String>>) -> Option<Option<String>> {
    value.map(|v| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListTicketsQuery {
    pub category: Option<TicketCategory>,
    pub status: Option<TicketStatus>,
    pub priority: Option<Priority>,
    pub business: Option<String>,
    pub assignee: Option<Uuid>,
    pub search: Option<String>,
    pub include_archived: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub business: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct SetAssigneesRequest {
    pub assignees: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateAttachmentRequest {
    pub storage_path: String,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub size_bytes: i64,
}

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct TicketStats {
    pub total: i64,
    pub by_category: BTreeMap<String, i64>,
    pub by_status: BTreeMap<String, i64>,
    pub by_priority: BTreeMap<String, i64>,
}

impl TicketStats {
    /// Every known key starts at zero so clients see a stable shape.
    pub fn compute<'a, I>(rows: I, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str, Option<DateTime<Utc>>)>,
    {
        let mut stats = Self {
            by_category: TicketCategory::ALL
                .iter()
                .map(|c| (c.as_str().to_string(), 0))
                .collect(),
            by_status: TicketStatus::ALL
                .iter()
                .map(|s| (s.as_str().to_string(), 0))
                .collect(),
            by_priority: Priority::ALL
                .iter()
                .map(|p| (p.as_str().to_string(), 0))
                .collect(),
            ..Default::default()
        };

        for (status, priority, due_date) in rows {
            let parsed = status.parse().unwrap_or(TicketStatus::Open);
            let category = categorize(parsed, due_date, now);
            stats.total += 1;
            *stats
                .by_category
                .entry(category.as_str().to_string())
                .or_default() += 1;
            *stats.by_status.entry(status.to_string()).or_default() += 1;
            *stats.by_priority.entry(priority.to_string()).or_default() += 1;
        }
        stats
    }
}
