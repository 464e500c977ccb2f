//! Goal-urgency reminder composition.
//!
//! Picks the incomplete goal with the nearest deadline and phrases a
//! notification for it. Days are counted by comparing local calendar dates,
//! so a deadline later today is "due today" regardless of the hour.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::models::{Book, Goal, ReadingSession};
use crate::progress::{far_future, GoalProgress};

/// A composed reminder, ready to hand to a notification channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reminder {
    pub title: String,
    pub body: String,
    /// The goal the reminder is about.
    pub goal_id: String,
    pub goal_name: String,
    pub days_left: i64,
    /// Number of incomplete goals considered.
    pub pending: usize,
}

/// Whole days between two local dates (negative when overdue).
pub fn days_until(today: NaiveDate, deadline: NaiveDate) -> i64 {
    (deadline - today).num_days()
}

/// Human phrase for a day count.
pub fn time_phrase(days_left: i64) -> String {
    match days_left {
        d if d < 0 => format!("overdue by {} day{}", -d, if d == -1 { "" } else { "s" }),
        0 => "due today".to_string(),
        1 => "due tomorrow".to_string(),
        d => format!("due in {} days", d),
    }
}

pub const SINGLE_TITLE: &str = "🎯 Your current goal";
pub const PRIORITY_TITLE: &str = "⚠️ Priority";

/// Compose the reminder for `goals`, or `None` when every goal is complete.
///
/// Completion uses the displayed progress, so automated goals are judged on
/// their aggregated value rather than the stored counter.
pub fn compose<Tz: TimeZone>(
    goals: &[Goal],
    books: &[Book],
    sessions: &[ReadingSession],
    now: &DateTime<Tz>,
) -> Option<Reminder> {
    let mut pending: Vec<&Goal> = goals
        .iter()
        .filter(|g| !GoalProgress::evaluate(g, books, sessions).completed)
        .collect();
    if pending.is_empty() {
        return None;
    }

    let deadline_of = |g: &Goal| -> DateTime<Utc> { g.deadline.unwrap_or_else(far_future) };
    pending.sort_by_key(|g| deadline_of(*g));

    let target = pending[0];
    let tz = now.timezone();
    // Undated goals sort last but read as due today.
    let deadline_day = target
        .deadline
        .map(|d| d.with_timezone(&tz).date_naive())
        .unwrap_or_else(|| now.date_naive());
    let days_left = days_until(now.date_naive(), deadline_day);
    let phrase = time_phrase(days_left);

    let (title, body) = if pending.len() == 1 {
        let body = match days_left {
            d if d <= 1 => format!("\"{}\" is {}.", target.name, phrase),
            d => format!("{} days left to finish \"{}\".", d, target.name),
        };
        (SINGLE_TITLE.to_string(), body)
    } else {
        (
            PRIORITY_TITLE.to_string(),
            format!(
                "\"{}\" is the priority ({}). {} goals pending.",
                target.name,
                phrase,
                pending.len()
            ),
        )
    };

    Some(Reminder {
        title,
        body,
        goal_id: target.id.clone(),
        goal_name: target.name.clone(),
        days_left,
        pending: pending.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GoalUnit;
    use chrono::{Duration, FixedOffset};

    fn goal(id: &str, name: &str, deadline: DateTime<Utc>) -> Goal {
        Goal {
            id: id.into(),
            name: name.into(),
            unit: GoalUnit::Chapters,
            current: 0.0,
            total: 10.0,
            deadline: Some(deadline),
            created_at: Some(deadline - Duration::days(60)),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap()
    }

    fn end_of_day(days_ahead: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 23, 59, 59).unwrap() + Duration::days(days_ahead)
    }

    #[test]
    fn priority_names_nearest_goal() {
        let goals = vec![
            goal("far", "Ten day sprint", end_of_day(10)),
            goal("near", "Finish Dune", end_of_day(2)),
        ];
        let r = compose(&goals, &[], &[], &now()).unwrap();
        assert_eq!(r.title, PRIORITY_TITLE);
        assert_eq!(r.goal_id, "near");
        assert_eq!(r.days_left, 2);
        assert!(r.body.contains("Finish Dune"));
        assert!(r.body.contains("priority"));
        assert!(r.body.contains("due in 2 days"));
        assert_eq!(r.pending, 2);
    }

    #[test]
    fn single_goal_due_today() {
        let goals = vec![goal("g", "Read 3 chapters", end_of_day(0))];
        let r = compose(&goals, &[], &[], &now()).unwrap();
        assert_eq!(r.title, SINGLE_TITLE);
        assert_eq!(r.days_left, 0);
        assert!(r.body.contains("due today"), "{}", r.body);
    }

    #[test]
    fn single_goal_days_left_phrase() {
        let goals = vec![goal("g", "Poetry", end_of_day(5))];
        let r = compose(&goals, &[], &[], &now()).unwrap();
        assert_eq!(r.body, "5 days left to finish \"Poetry\".");
    }

    #[test]
    fn completed_goals_are_skipped() {
        let mut done = goal("done", "Done", end_of_day(1));
        done.current = 10.0;
        let open = goal("open", "Open", end_of_day(7));
        let r = compose(&[done.clone(), open], &[], &[], &now()).unwrap();
        assert_eq!(r.goal_id, "open");
        assert_eq!(r.title, SINGLE_TITLE);
        assert!(compose(&[done], &[], &[], &now()).is_none());
    }

    #[test]
    fn overdue_goal() {
        let goals = vec![goal("g", "Late", end_of_day(-3))];
        let r = compose(&goals, &[], &[], &now()).unwrap();
        assert_eq!(r.days_left, -3);
        assert!(r.body.contains("overdue by 3 days"));
    }

    #[test]
    fn days_are_date_only_in_local_time() {
        // 23:30 UTC on the 19th is already the 20th in UTC+2.
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let now_local = tz.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();
        let deadline = Utc.with_ymd_and_hms(2026, 10, 19, 23, 30, 0).unwrap();
        let r = compose(&[goal("g", "Tomorrow", deadline)], &[], &[], &now_local).unwrap();
        assert_eq!(r.days_left, 1);
        assert!(r.body.contains("due tomorrow"));
    }

    #[test]
    fn undated_goal_sorts_last_and_reads_due_today() {
        let mut undated = goal("u", "Someday", end_of_day(0));
        undated.deadline = None;

        let r = compose(&[undated.clone()], &[], &[], &now()).unwrap();
        assert_eq!(r.days_left, 0);
        assert!(r.body.contains("due today"), "{}", r.body);

        let dated = goal("d", "Dated", end_of_day(30));
        let r = compose(&[undated, dated], &[], &[], &now()).unwrap();
        assert_eq!(r.goal_id, "d");
        assert_eq!(r.days_left, 30);
    }

    #[test]
    fn phrases() {
        assert_eq!(time_phrase(-1), "overdue by 1 day");
        assert_eq!(time_phrase(0), "due today");
        assert_eq!(time_phrase(1), "due tomorrow");
        assert_eq!(time_phrase(9), "due in 9 days");
    }
}
