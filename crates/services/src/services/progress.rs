use chrono::{DateTime, NaiveDate, Utc};
use db::models::{
    status::{DONE_LABEL, OVERDUE_LABEL},
    task::TaskDigest,
};
use serde::Serialize;
use ts_rs::TS;

/// Derived completion figures for a project or phase scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
pub struct TaskProgress {
    pub total_count: u64,
    pub completed_count: u64,
    /// Rounded percentage in [0, 100]; 0 for an empty scope.
    pub completion_percentage: u32,
    pub overdue_count: u64,
    pub today_completed_count: u64,
}

/// Pure aggregation over a label-resolved task snapshot. `now` is
/// injected so callers and tests agree on what "today" means; all
/// calendar math is UTC.
pub fn aggregate(tasks: &[TaskDigest], now: DateTime<Utc>) -> TaskProgress {
    let today = now.date_naive();
    let total_count = tasks.len() as u64;

    let completed_count = tasks
        .iter()
        .filter(|task| task.status_label == DONE_LABEL)
        .count() as u64;

    let completion_percentage = if total_count == 0 {
        0
    } else {
        ((completed_count as f64 / total_count as f64) * 100.0).round() as u32
    };

    // The persisted Overdue status is only a display hint written by a
    // best-effort sweep; the date comparison is checked independently so
    // a task counts as overdue even before the sweep has run.
    let overdue_count = tasks
        .iter()
        .filter(|task| {
            task.status_label == OVERDUE_LABEL
                || (task.end_date.is_some_and(|end| end < today)
                    && task.status_label != DONE_LABEL)
        })
        .count() as u64;

    let today_completed_count = tasks
        .iter()
        .filter(|task| {
            task.status_label == DONE_LABEL && task.updated_at.date_naive() == today
        })
        .count() as u64;

    TaskProgress {
        total_count,
        completed_count,
        completion_percentage,
        overdue_count,
        today_completed_count,
    }
}

/// Human-readable deadline distance for a task or phase end date.
pub fn days_remaining_text(end_date: Option<NaiveDate>, today: NaiveDate) -> String {
    let Some(end_date) = end_date else {
        return "No deadline set".to_string();
    };

    let days = (end_date - today).num_days();
    match days {
        0 => "Due today".to_string(),
        1 => "1 day remaining".to_string(),
        -1 => "1 day overdue".to_string(),
        n if n > 1 => format!("{n} days remaining"),
        n => format!("{} days overdue", -n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn digest(label: &str, end_date: Option<NaiveDate>, updated_at: DateTime<Utc>) -> TaskDigest {
        TaskDigest {
            status_label: label.to_string(),
            end_date,
            updated_at,
        }
    }

    #[test]
    fn empty_scope_aggregates_to_zero() {
        let progress = aggregate(&[], Utc::now());
        assert_eq!(progress.total_count, 0);
        assert_eq!(progress.completion_percentage, 0);
        assert_eq!(progress.overdue_count, 0);
    }

    #[test]
    fn percentage_stays_within_bounds_and_rounds() {
        let now = Utc::now();
        let tasks = vec![
            digest(DONE_LABEL, None, now),
            digest("In Progress", None, now),
            digest("Not Started", None, now),
        ];
        let progress = aggregate(&tasks, now);
        assert_eq!(progress.completed_count, 1);
        assert_eq!(progress.completion_percentage, 33);

        let all_done = vec![digest(DONE_LABEL, None, now); 4];
        assert_eq!(aggregate(&all_done, now).completion_percentage, 100);
    }

    #[test]
    fn overdue_counts_by_date_even_without_the_status_write() {
        let now = Utc::now();
        let yesterday = now.date_naive() - Duration::days(1);
        let tomorrow = now.date_naive() + Duration::days(1);

        let tasks = vec![
            // Past due but the sweeper has not run: still counted.
            digest("In Progress", Some(yesterday), now),
            // Status already flipped by the sweeper.
            digest(OVERDUE_LABEL, Some(yesterday), now),
            // Done tasks are never overdue regardless of date.
            digest(DONE_LABEL, Some(yesterday), now),
            digest("In Progress", Some(tomorrow), now),
            digest("In Progress", None, now),
        ];
        assert_eq!(aggregate(&tasks, now).overdue_count, 2);
    }

    #[test]
    fn today_completed_requires_same_calendar_date() {
        let now = Utc::now();
        let tasks = vec![
            digest(DONE_LABEL, None, now),
            digest(DONE_LABEL, None, now - Duration::days(2)),
            digest("In Progress", None, now),
        ];
        assert_eq!(aggregate(&tasks, now).today_completed_count, 1);
    }

    #[test]
    fn days_remaining_covers_all_shapes() {
        let today = Utc::now().date_naive();
        assert_eq!(days_remaining_text(None, today), "No deadline set");
        assert_eq!(days_remaining_text(Some(today), today), "Due today");
        assert_eq!(
            days_remaining_text(Some(today + Duration::days(1)), today),
            "1 day remaining"
        );
        assert_eq!(
            days_remaining_text(Some(today + Duration::days(5)), today),
            "5 days remaining"
        );
        assert_eq!(
            days_remaining_text(Some(today - Duration::days(1)), today),
            "1 day overdue"
        );
        assert_eq!(
            days_remaining_text(Some(today - Duration::days(3)), today),
            "3 days overdue"
        );
    }
}
