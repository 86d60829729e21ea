use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::shared::schema::{task_checks, task_definitions};

/// Weekdays are numbered 0 (Sunday) through 6 (Saturday).
pub const DEFAULT_WEEKDAYS: [i16; 5] = [1, 2, 3, 4, 5];

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = task_definitions)]
pub struct TaskDefinition {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub assignee_id: Uuid,
    pub weekdays: Vec<i16>,
    pub active: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = task_definitions)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub assignee_id: Option<Uuid>,
    pub weekdays: Option<Vec<i16>>,
    pub active: Option<bool>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// One check-in per task, user and local date.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = task_checks)]
pub struct TaskCheck {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub check_date: NaiveDate,
    pub completed_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    Inactive,
    Done,
    Upcoming,
    Pending,
    Overdue,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChecklistItem {
    #[serde(flatten)]
    pub task: TaskDefinition,
    pub date: NaiveDate,
    pub status: DayStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TaskCompliance {
    pub task_id: Uuid,
    pub title: String,
    pub expected: u32,
    pub completed: u32,
    pub percentage: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ComplianceReport {
    pub user_id: Uuid,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub expected: u32,
    pub completed: u32,
    pub percentage: Option<f64>,
    pub tasks: Vec<TaskCompliance>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    pub assignee_id: Uuid,
    pub weekdays: Option<Vec<i16>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub assignee_id: Option<Uuid>,
    pub weekdays: Option<Vec<i16>>,
    pub active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListTasksQuery {
    pub assignee: Option<Uuid>,
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct TodayQuery {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckTaskRequest {
    pub date: Option<NaiveDate>,
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckDateQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ComplianceQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CutoffSetting {
    pub cutoff: String,
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Deserialize)]
pub struct SetCutoffRequest {
    pub cutoff: String,
}

/// Sorted, deduplicated weekdays. Rejects empty lists and values outside
/// 0..=6.
pub fn validate_weekdays(weekdays: Vec<i16>) -> Result<Vec<i16>, String> {
    if let Some(bad) = weekdays.iter().find(|d| !(0..=6).contains(*d)) {
        return Err(format!("Invalid weekday {bad}; expected 0 (Sunday) to 6"));
    }
    let mut days = weekdays;
    days.sort_unstable();
    days.dedup();
    if days.is_empty() {
        return Err("At least one weekday is required".to_string());
    }
    Ok(days)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_weekdays() {
        assert_eq!(validate_weekdays(vec![5, 1, 1, 3]), Ok(vec![1, 3, 5]));
        assert!(validate_weekdays(vec![]).is_err());
        assert!(validate_weekdays(vec![0, 7]).is_err());
        assert!(validate_weekdays(vec![-1]).is_err());
    }

    #[test]
    fn test_day_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(DayStatus::Overdue).unwrap(),
            serde_json::json!("overdue")
        );
    }
}
