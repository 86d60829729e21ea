//! Weekly checklist arithmetic. All dates here are local calendar dates;
//! callers convert from UTC with the configured offset first.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime};
use std::collections::HashSet;
use uuid::Uuid;

use crate::tasks::types::{ComplianceReport, DayStatus, TaskCheck, TaskCompliance, TaskDefinition};

pub fn weekday_index(date: NaiveDate) -> i16 {
    date.weekday().num_days_from_sunday() as i16
}

pub fn is_active_on(weekdays: &[i16], date: NaiveDate) -> bool {
    weekdays.contains(&weekday_index(date))
}

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Longest compliance range, in days, a single request may cover.
pub const MAX_RANGE_DAYS: i64 = 366;

/// Rejects reversed ranges and ranges longer than [`MAX_RANGE_DAYS`].
pub fn validate_range(from: NaiveDate, to: NaiveDate) -> Result<(), String> {
    if from > to {
        return Err(format!("Range start {from} is after its end {to}"));
    }
    let days = (to - from).num_days() + 1;
    if days > MAX_RANGE_DAYS {
        return Err(format!("Range of {days} days exceeds the maximum of {MAX_RANGE_DAYS}"));
    }
    Ok(())
}

/// Active weekdays in the inclusive range.
pub fn expected_occurrences(weekdays: &[i16], from: NaiveDate, to: NaiveDate) -> u32 {
    if from > to {
        return 0;
    }
    let days = (to - from).num_days() + 1;
    let active: HashSet<i16> = weekdays
        .iter()
        .copied()
        .filter(|d| (0..=6).contains(d))
        .collect();
    let full_weeks = days / 7;
    let tail = from
        .iter_days()
        .skip((full_weeks * 7) as usize)
        .take((days % 7) as usize)
        .filter(|d| active.contains(&weekday_index(*d)))
        .count() as i64;
    (full_weeks * active.len() as i64 + tail) as u32
}

/// Completed check-ins on distinct active days within the range.
pub fn completed_occurrences<'a>(
    weekdays: &[i16],
    checks: impl IntoIterator<Item = &'a TaskCheck>,
    from: NaiveDate,
    to: NaiveDate,
) -> u32 {
    checks
        .into_iter()
        .filter(|c| c.completed_at.is_some())
        .map(|c| c.check_date)
        .filter(|d| *d >= from && *d <= to && is_active_on(weekdays, *d))
        .collect::<HashSet<_>>()
        .len() as u32
}

/// Percentage with two decimals; `None` when nothing was expected.
pub fn percentage(completed: u32, expected: u32) -> Option<f64> {
    if expected == 0 {
        return None;
    }
    let pct = f64::from(completed) * 100.0 / f64::from(expected);
    Some((pct * 100.0).round() / 100.0)
}

/// Compliance of `user_id` over their active tasks. Only the assignee's own
/// check-ins count.
pub fn compliance_report(
    user_id: Uuid,
    tasks: &[TaskDefinition],
    checks: &[TaskCheck],
    from: NaiveDate,
    to: NaiveDate,
) -> ComplianceReport {
    let per_task: Vec<TaskCompliance> = tasks
        .iter()
        .filter(|t| t.active && t.assignee_id == user_id)
        .map(|task| {
            let expected = expected_occurrences(&task.weekdays, from, to);
            let completed = completed_occurrences(
                &task.weekdays,
                checks
                    .iter()
                    .filter(|c| c.task_id == task.id && c.user_id == user_id),
                from,
                to,
            );
            TaskCompliance {
                task_id: task.id,
                title: task.title.clone(),
                expected,
                completed,
                percentage: percentage(completed, expected),
            }
        })
        .collect();

    let expected = per_task.iter().map(|t| t.expected).sum();
    let completed = per_task.iter().map(|t| t.completed).sum();

    ComplianceReport {
        user_id,
        from,
        to,
        expected,
        completed,
        percentage: percentage(completed, expected),
        tasks: per_task,
    }
}

/// Status of a task on `date`, judged at local time `now`.
pub fn day_status(
    weekdays: &[i16],
    date: NaiveDate,
    checked: bool,
    now: DateTime<FixedOffset>,
    cutoff: NaiveTime,
) -> DayStatus {
    if !is_active_on(weekdays, date) {
        return DayStatus::Inactive;
    }
    if checked {
        return DayStatus::Done;
    }
    let today = now.date_naive();
    if date > today {
        DayStatus::Upcoming
    } else if date < today || now.time() >= cutoff {
        DayStatus::Overdue
    } else {
        DayStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const WEEKDAYS: [i16; 5] = [1, 2, 3, 4, 5];

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn task(assignee: Uuid, weekdays: &[i16]) -> TaskDefinition {
        TaskDefinition {
            id: Uuid::new_v4(),
            title: "Check backups".to_string(),
            description: None,
            assignee_id: assignee,
            weekdays: weekdays.to_vec(),
            active: true,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn check(task: &TaskDefinition, user: Uuid, day: &str, done: bool) -> TaskCheck {
        TaskCheck {
            id: Uuid::new_v4(),
            task_id: task.id,
            user_id: user,
            check_date: date(day),
            completed_at: done.then(Utc::now),
            note: None,
        }
    }

    #[test]
    fn test_weekday_numbering_starts_sunday() {
        // 2024-06-09 is a Sunday.
        assert_eq!(weekday_index(date("2024-06-09")), 0);
        assert_eq!(weekday_index(date("2024-06-15")), 6);
    }

    #[test]
    fn test_week_start_is_monday() {
        assert_eq!(week_start(date("2024-06-12")), date("2024-06-10"));
        assert_eq!(week_start(date("2024-06-10")), date("2024-06-10"));
        assert_eq!(week_start(date("2024-06-09")), date("2024-06-03"));
    }

    #[test]
    fn test_expected_occurrences() {
        // Mon 2024-06-10 .. Sun 2024-06-16
        assert_eq!(
            expected_occurrences(&WEEKDAYS, date("2024-06-10"), date("2024-06-16")),
            5
        );
        assert_eq!(
            expected_occurrences(&[0, 6], date("2024-06-10"), date("2024-06-16")),
            2
        );
        assert_eq!(
            expected_occurrences(&WEEKDAYS, date("2024-06-16"), date("2024-06-10")),
            0
        );
    }

    #[test]
    fn test_expected_occurrences_over_long_ranges() {
        // 2024 is a leap year starting on Monday: 262 weekdays, 104 weekend days.
        assert_eq!(
            expected_occurrences(&WEEKDAYS, date("2024-01-01"), date("2024-12-31")),
            262
        );
        assert_eq!(
            expected_occurrences(&[0, 6], date("2024-01-01"), date("2024-12-31")),
            104
        );
        assert_eq!(
            expected_occurrences(&[1, 1, 3], date("2024-06-10"), date("2024-06-26")),
            6
        );
        assert_eq!(
            expected_occurrences(&WEEKDAYS, date("2024-06-12"), date("2024-06-12")),
            1
        );
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range(date("2024-01-01"), date("2024-12-31")).is_ok());
        assert!(validate_range(date("2024-06-12"), date("2024-06-12")).is_ok());
        assert!(validate_range(date("2024-06-12"), date("2024-06-11")).is_err());
        assert!(validate_range(date("2023-01-01"), date("2024-01-02")).is_err());
        assert!(validate_range(date("0001-01-01"), date("9999-12-31")).is_err());
    }

    #[test]
    fn test_completed_ignores_inactive_days_and_open_checks() {
        let user = Uuid::new_v4();
        let t = task(user, &WEEKDAYS);
        let checks = vec![
            check(&t, user, "2024-06-10", true),
            check(&t, user, "2024-06-11", false),
            check(&t, user, "2024-06-15", true), // Saturday
            check(&t, user, "2024-06-20", true), // out of range
        ];
        assert_eq!(
            completed_occurrences(&t.weekdays, &checks, date("2024-06-10"), date("2024-06-16")),
            1
        );
    }

    #[test]
    fn test_compliance_report_sums_tasks() {
        let user = Uuid::new_v4();
        let daily = task(user, &WEEKDAYS);
        let monday_only = task(user, &[1]);
        let mut retired = task(user, &WEEKDAYS);
        retired.active = false;
        let someone_else = task(Uuid::new_v4(), &WEEKDAYS);

        let checks = vec![
            check(&daily, user, "2024-06-10", true),
            check(&daily, user, "2024-06-11", true),
            check(&daily, user, "2024-06-12", true),
            check(&monday_only, user, "2024-06-10", true),
            check(&retired, user, "2024-06-10", true),
        ];
        let tasks = vec![daily, monday_only, retired, someone_else];

        let report = compliance_report(
            user,
            &tasks,
            &checks,
            date("2024-06-10"),
            date("2024-06-14"),
        );

        assert_eq!(report.tasks.len(), 2);
        assert_eq!(report.expected, 6);
        assert_eq!(report.completed, 4);
        assert_eq!(report.percentage, Some(66.67));
        assert_eq!(report.tasks[1].percentage, Some(100.0));
    }

    #[test]
    fn test_compliance_is_null_without_expectations() {
        let user = Uuid::new_v4();
        let weekend = task(user, &[0, 6]);
        let report = compliance_report(
            user,
            &[weekend],
            &[],
            date("2024-06-10"),
            date("2024-06-14"),
        );
        assert_eq!(report.expected, 0);
        assert_eq!(report.percentage, None);
    }

    #[test]
    fn test_day_status() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let cutoff = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        // 09:30 local on Wednesday 2024-06-12
        let morning = offset.with_ymd_and_hms(2024, 6, 12, 9, 30, 0).unwrap();
        let noon = offset.with_ymd_and_hms(2024, 6, 12, 12, 0, 0).unwrap();
        let today = date("2024-06-12");

        assert_eq!(
            day_status(&WEEKDAYS, today, false, morning, cutoff),
            DayStatus::Pending
        );
        assert_eq!(
            day_status(&WEEKDAYS, today, false, noon, cutoff),
            DayStatus::Overdue
        );
        assert_eq!(
            day_status(&WEEKDAYS, today, true, noon, cutoff),
            DayStatus::Done
        );
        assert_eq!(
            day_status(&WEEKDAYS, date("2024-06-11"), false, morning, cutoff),
            DayStatus::Overdue
        );
        assert_eq!(
            day_status(&WEEKDAYS, date("2024-06-13"), false, noon, cutoff),
            DayStatus::Upcoming
        );
        assert_eq!(
            day_status(&WEEKDAYS, date("2024-06-15"), false, noon, cutoff),
            DayStatus::Inactive
        );
    }

    #[test]
    fn test_cutoff_boundary_is_overdue() {
        let offset = FixedOffset::east_opt(0).unwrap();
        let cutoff = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        let at_cutoff = offset.with_ymd_and_hms(2024, 6, 12, 10, 0, 0).unwrap();
        assert_eq!(
            day_status(&WEEKDAYS, date("2024-06-12"), false, at_cutoff, cutoff),
            DayStatus::Overdue
        );
    }
}
