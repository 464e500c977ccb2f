//! Goal progress aggregation.
//!
//! Automated goals never store their progress. It is recomputed from the
//! user's books and sessions whose relevant date falls inside the goal
//! window `[createdAt, deadline]` (both ends inclusive):
//!
//! | Unit     | Progress |
//! |----------|----------|
//! | Books    | Read books finished in the window |
//! | Pages    | `currentPage` of every Reading book + `totalPages` of Read books finished in the window |
//! | Hours    | session seconds in the window / 3600, two decimals |
//! | Chapters | the stored manual counter |

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use crate::models::{Book, BookStatus, Goal, GoalUnit, ReadingSession};

/// Inclusive time window a goal aggregates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Deadline assumed for goals stored without one.
pub fn far_future() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl Window {
    /// Missing `createdAt` opens the window at the epoch; a missing deadline
    /// closes it at 2100-01-01.
    pub fn for_goal(goal: &Goal) -> Self {
        Self {
            start: goal.created_at.unwrap_or_default(),
            end: goal.deadline.unwrap_or_else(far_future),
        }
    }

    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        *ts >= self.start && *ts <= self.end
    }

    fn contains_opt(&self, ts: Option<&DateTime<Utc>>) -> bool {
        ts.map(|t| self.contains(t)).unwrap_or(false)
    }
}

/// Round to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Current progress of `goal`, in its own unit.
pub fn current_progress(goal: &Goal, books: &[Book], sessions: &[ReadingSession]) -> f64 {
    let window = Window::for_goal(goal);
    let finished_in_window =
        |b: &&Book| b.status == BookStatus::Read && window.contains_opt(b.finished_at.as_ref());

    match goal.unit {
        GoalUnit::Chapters => goal.current,
        GoalUnit::Books => books.iter().filter(finished_in_window).count() as f64,
        GoalUnit::Pages => {
            let reading: u64 = books
                .iter()
                .filter(|b| b.status == BookStatus::Reading)
                .map(|b| b.current_page as u64)
                .sum();
            let finished: u64 = books
                .iter()
                .filter(finished_in_window)
                .map(|b| b.total_pages as u64)
                .sum();
            (reading + finished) as f64
        }
        GoalUnit::Hours => {
            let seconds: u64 = sessions
                .iter()
                .filter(|s| window.contains_opt(s.created_at.as_ref()))
                .map(|s| s.duration_seconds)
                .sum();
            round2(seconds as f64 / 3600.0)
        }
    }
}

/// Percentage of `target` reached, clamped to `[0, 100]`.
pub fn percent(current: f64, target: f64) -> f64 {
    if target <= 0.0 || !target.is_finite() || !current.is_finite() {
        return 0.0;
    }
    ((current / target) * 100.0).clamp(0.0, 100.0)
}

/// Displayed progress of one goal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GoalProgress {
    pub current: f64,
    pub target: f64,
    pub percent: f64,
    pub completed: bool,
    pub automated: bool,
}

impl GoalProgress {
    pub fn evaluate(goal: &Goal, books: &[Book], sessions: &[ReadingSession]) -> Self {
        let current = current_progress(goal, books, sessions);
        Self {
            current,
            target: goal.total,
            percent: percent(current, goal.total),
            completed: current >= goal.total,
            automated: goal.unit.is_automated(),
        }
    }
}

/// New manual counter after a `+by`/`-by` click. Never below zero.
pub fn bump_manual(current: f64, by: f64) -> f64 {
    (current + by).max(0.0)
}

/// Urgency badge shown next to a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GoalStanding {
    Completed,
    Overdue { days: i64 },
    DueSoon { days: i64 },
    OnTrack { days: i64 },
}

/// Goals due within this many days are flagged [`GoalStanding::DueSoon`].
pub const DUE_SOON_DAYS: i64 = 3;

impl GoalStanding {
    /// Days left are the ceiling of the remaining time (not date-stripped).
    pub fn of(goal: &Goal, completed: bool, now: DateTime<Utc>) -> Self {
        if completed {
            return GoalStanding::Completed;
        }
        let deadline = goal.deadline.unwrap_or(now);
        let remaining_ms = (deadline - now).num_milliseconds();
        let days = div_ceil(remaining_ms, 86_400_000);
        if days < 0 {
            GoalStanding::Overdue { days: -days }
        } else if days <= DUE_SOON_DAYS {
            GoalStanding::DueSoon { days }
        } else {
            GoalStanding::OnTrack { days }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            GoalStanding::Completed => "completed!".to_string(),
            GoalStanding::Overdue { days } => format!("overdue by {} days", days),
            GoalStanding::DueSoon { days } => format!("{} days left (close!)", days),
            GoalStanding::OnTrack { days } => format!("{} days left", days),
        }
    }
}

fn div_ceil(a: i64, b: i64) -> i64 {
    let q = a / b;
    if a % b > 0 {
        q + 1
    } else {
        q
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap()
    }

    fn goal(unit: GoalUnit, total: f64) -> Goal {
        Goal {
            id: "g".into(),
            name: "March".into(),
            unit,
            current: 0.0,
            total,
            deadline: Some(at(31)),
            created_at: Some(at(1)),
        }
    }

    fn book(status: BookStatus, total: u32, current: u32, finished: Option<DateTime<Utc>>) -> Book {
        Book {
            id: String::new(),
            title: "t".into(),
            author: "a".into(),
            status,
            total_pages: total,
            current_page: current,
            finished_at: finished,
            rating: 0,
            review: String::new(),
            created_at: None,
        }
    }

    fn session(secs: u64, at: DateTime<Utc>) -> ReadingSession {
        ReadingSession {
            id: String::new(),
            book_id: "b".into(),
            book_title: "t".into(),
            duration_seconds: secs,
            created_at: Some(at),
            device: Default::default(),
        }
    }

    #[test]
    fn hours_sum_sessions_in_window() {
        let sessions = vec![
            session(1800, at(2)),
            session(900, at(10)),
            session(3600, at(31)),
            session(7200, Utc.with_ymd_and_hms(2026, 2, 27, 9, 0, 0).unwrap()),
        ];
        let g = goal(GoalUnit::Hours, 10.0);
        assert_eq!(current_progress(&g, &[], &sessions), 1.75);
    }

    #[test]
    fn hours_round_to_two_decimals() {
        let sessions = vec![session(1000, at(5))];
        assert_eq!(current_progress(&goal(GoalUnit::Hours, 1.0), &[], &sessions), 0.28);
    }

    #[test]
    fn books_count_only_finished_in_window() {
        let books = vec![
            book(BookStatus::Read, 100, 100, Some(at(5))),
            book(BookStatus::Read, 100, 100, Some(at(31))),
            book(BookStatus::Read, 100, 100, None),
            book(BookStatus::Read, 100, 100, Some(at(31) + Duration::seconds(1))),
            book(BookStatus::Reading, 100, 40, None),
        ];
        assert_eq!(current_progress(&goal(GoalUnit::Books, 3.0), &books, &[]), 2.0);
    }

    #[test]
    fn pages_combine_reading_and_finished() {
        let books = vec![
            book(BookStatus::Reading, 300, 45, None),
            book(BookStatus::Reading, 200, 5, None),
            book(BookStatus::Read, 250, 250, Some(at(20))),
            book(BookStatus::Read, 999, 999, Some(at(1) - Duration::days(3))),
            book(BookStatus::ToRead, 100, 0, None),
        ];
        assert_eq!(current_progress(&goal(GoalUnit::Pages, 500.0), &books, &[]), 300.0);
    }

    #[test]
    fn chapters_use_manual_counter() {
        let mut g = goal(GoalUnit::Chapters, 12.0);
        g.current = 4.0;
        let books = vec![book(BookStatus::Read, 100, 100, Some(at(5)))];
        let p = GoalProgress::evaluate(&g, &books, &[]);
        assert_eq!(p.current, 4.0);
        assert!(!p.automated);
        assert!(!p.completed);
    }

    #[test]
    fn percent_is_clamped() {
        assert_eq!(percent(250.0, 100.0), 100.0);
        assert_eq!(percent(-5.0, 100.0), 0.0);
        assert_eq!(percent(5.0, 0.0), 0.0);
        assert_eq!(percent(1.0, 4.0), 25.0);

        let g = goal(GoalUnit::Pages, 10.0);
        let books = vec![book(BookStatus::Reading, 900, 800, None)];
        let p = GoalProgress::evaluate(&g, &books, &[]);
        assert_eq!(p.percent, 100.0);
        assert!(p.completed);
    }

    #[test]
    fn missing_window_bounds_default_open() {
        let mut g = goal(GoalUnit::Books, 1.0);
        g.created_at = None;
        g.deadline = None;
        let w = Window::for_goal(&g);
        assert!(w.contains(&Utc.with_ymd_and_hms(1999, 1, 1, 0, 0, 0).unwrap()));
        assert!(w.contains(&far_future()));
    }

    #[test]
    fn bump_never_goes_negative() {
        assert_eq!(bump_manual(2.0, 1.0), 3.0);
        assert_eq!(bump_manual(0.0, -1.0), 0.0);
    }

    #[test]
    fn standing_badges() {
        let g = goal(GoalUnit::Books, 1.0);
        assert_eq!(GoalStanding::of(&g, true, at(2)), GoalStanding::Completed);
        assert_eq!(
            GoalStanding::of(&g, false, at(31) + Duration::days(2)),
            GoalStanding::Overdue { days: 2 }
        );
        assert_eq!(
            GoalStanding::of(&g, false, at(29) + Duration::hours(1)),
            GoalStanding::DueSoon { days: 2 }
        );
        assert_eq!(GoalStanding::of(&g, false, at(21)), GoalStanding::OnTrack { days: 10 });
    }
}
