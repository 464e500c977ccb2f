//! Goals: create, list with derived progress, manual bump, delete.

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use shelf_core::models::{Book, Goal, GoalUnit, ReadingSession, Record};
use shelf_core::progress::{bump_manual, far_future, round2, GoalProgress, GoalStanding};
use shelf_core::store::StoreError;

use crate::client::{new_id, query, UserScope};
use crate::error::invalid;
use crate::optimistic::{self, Saved};

/// Goal form input. Hours goals may give `hours` and `minutes` instead of
/// `total`; `deadline` is a calendar date (`YYYY-MM-DD`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalInput {
    #[serde(default)]
    pub name: String,
    pub unit: GoalUnit,
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub hours: Option<f64>,
    #[serde(default)]
    pub minutes: Option<f64>,
    #[serde(default)]
    pub deadline: String,
}

/// End of `date` (23:59:59) in `tz`.
pub fn end_of_day<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Result<DateTime<Utc>> {
    let naive = date
        .and_hms_opt(23, 59, 59)
        .ok_or_else(|| invalid("invalid deadline"))?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| invalid("deadline does not exist in the local time zone"))
}

impl GoalInput {
    fn target(&self) -> Result<f64> {
        let target = match (self.unit, self.total) {
            (GoalUnit::Hours, None) => {
                let hours = self.hours.unwrap_or(0.0);
                let minutes = self.minutes.unwrap_or(0.0);
                if hours < 0.0 || minutes < 0.0 {
                    return Err(invalid("hours and minutes must not be negative"));
                }
                hours + minutes / 60.0
            }
            (_, Some(total)) => total,
            (_, None) => return Err(invalid("goal target is required")),
        };
        if !target.is_finite() || target <= 0.0 {
            return Err(invalid("goal target must be greater than 0"));
        }
        Ok(round2(target))
    }

    pub fn into_goal<Tz: TimeZone>(self, tz: &Tz, now: DateTime<Utc>) -> Result<Goal> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(invalid("goal name is required"));
        }
        let deadline = self.deadline.trim();
        if deadline.is_empty() {
            return Err(invalid("goal deadline is required"));
        }
        let date = NaiveDate::parse_from_str(deadline, "%Y-%m-%d")
            .map_err(|_| invalid(format!("invalid deadline '{}': expected YYYY-MM-DD", deadline)))?;
        let total = self.target()?;

        Ok(Goal {
            id: String::new(),
            name: name.to_string(),
            unit: self.unit,
            current: 0.0,
            total,
            deadline: Some(end_of_day(tz, date)?),
            created_at: Some(now),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Added {
    pub id: String,
    pub saved: Saved,
}

pub async fn create(scope: &UserScope, input: GoalInput, timeout: Duration) -> Result<Added> {
    let mut goal = input.into_goal(&Local, Utc::now())?;
    let id = new_id();
    goal.set_id(id.clone());

    tracing::info!(id = %id, name = %goal.name, unit = %goal.unit, total = goal.total, "creating goal");
    let writer = scope.clone();
    let saved = optimistic::save("goal", async move { writer.create(goal).await }, timeout).await?;
    Ok(Added { id, saved })
}

/// A goal as displayed: stored fields plus derived progress and standing.
#[derive(Debug, Clone, Serialize)]
pub struct GoalView {
    #[serde(flatten)]
    pub goal: Goal,
    pub progress: GoalProgress,
    pub standing: GoalStanding,
    pub standing_label: String,
}

/// Evaluate `goals` against the user's books and sessions. Nearest deadline first.
pub fn evaluate(
    mut goals: Vec<Goal>,
    books: &[Book],
    sessions: &[ReadingSession],
    now: DateTime<Utc>,
) -> Vec<GoalView> {
    goals.sort_by_key(|g| g.deadline.unwrap_or_else(far_future));
    goals
        .into_iter()
        .map(|goal| {
            let progress = GoalProgress::evaluate(&goal, books, sessions);
            let standing = GoalStanding::of(&goal, progress.completed, now);
            GoalView {
                standing_label: standing.describe(),
                goal,
                progress,
                standing,
            }
        })
        .collect()
}

/// Everything progress aggregation needs, fetched in one go.
pub struct Snapshot {
    pub goals: Vec<Goal>,
    pub books: Vec<Book>,
    pub sessions: Vec<ReadingSession>,
}

pub async fn fetch_snapshot(scope: &UserScope) -> Result<Snapshot> {
    Ok(Snapshot {
        goals: scope.fetch(&query::<Goal>()).await?,
        books: scope.fetch(&query::<Book>()).await?,
        sessions: scope.fetch(&query::<ReadingSession>()).await?,
    })
}

pub async fn list(scope: &UserScope, now: DateTime<Utc>) -> Result<Vec<GoalView>> {
    let snap = fetch_snapshot(scope).await?;
    Ok(evaluate(snap.goals, &snap.books, &snap.sessions, now))
}

async fn require(scope: &UserScope, id: &str) -> Result<Goal> {
    scope
        .get::<Goal>(id)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("goal {}", id)).into())
}

/// Adjust a manual (Chapters) goal by `by`, never below zero.
pub async fn bump(scope: &UserScope, id: &str, by: f64) -> Result<Goal> {
    let mut goal = require(scope, id).await?;
    if goal.unit.is_automated() {
        return Err(invalid(format!(
            "progress of {} goals is computed from your books and sessions",
            goal.unit
        )));
    }
    if !by.is_finite() {
        return Err(invalid("bump amount must be a number"));
    }
    goal.current = bump_manual(goal.current, by);

    let mut fields = Map::new();
    fields.insert("current".into(), Value::from(goal.current));
    scope.update::<Goal>(id, fields).await?;
    Ok(goal)
}

pub async fn delete(scope: &UserScope, id: &str) -> Result<()> {
    require(scope, id).await?;
    scope.delete::<Goal>(id).await?;
    tracing::info!(id, "deleted goal");
    Ok(())
}

pub fn print_views(views: &[GoalView]) {
    if views.is_empty() {
        println!("No goals yet.");
        return;
    }
    for v in views {
        let deadline = v
            .goal
            .deadline
            .map(|d| d.with_timezone(&Local).format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {}  {}/{} {}  ({:.0}%)  due {}  [{}]",
            v.goal.id,
            v.goal.name,
            v.progress.current,
            v.progress.target,
            v.goal.unit,
            v.progress.percent,
            deadline,
            v.standing_label
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use crate::error::{classify, ErrorKind};
    use chrono::{Duration as ChronoDuration, FixedOffset};
    use shelf_core::models::BookStatus;
    use shelf_core::store::memory::InMemoryStore;
    use std::sync::Arc;

    fn input(unit: GoalUnit) -> GoalInput {
        GoalInput {
            name: "Winter reading".into(),
            unit,
            total: Some(5.0),
            hours: None,
            minutes: None,
            deadline: "2026-12-31".into(),
        }
    }

    #[test]
    fn hours_target_combines_hours_and_minutes() {
        let mut i = input(GoalUnit::Hours);
        i.total = None;
        i.hours = Some(1.0);
        i.minutes = Some(20.0);
        let goal = i.into_goal(&Utc, Utc::now()).unwrap();
        assert_eq!(goal.total, 1.33);
        assert_eq!(goal.current, 0.0);
    }

    #[test]
    fn deadline_is_end_of_local_day() {
        let tz = FixedOffset::east_opt(-3 * 3600).unwrap();
        let goal = input(GoalUnit::Books).into_goal(&tz, Utc::now()).unwrap();
        let deadline = goal.deadline.unwrap().with_timezone(&tz);
        assert_eq!(deadline.format("%Y-%m-%d %H:%M:%S").to_string(), "2026-12-31 23:59:59");
    }

    #[test]
    fn days_left_rounds_up_to_the_deadline_evening() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let mut i = input(GoalUnit::Chapters);
        i.deadline = "2026-10-24".into();
        let goal = i.into_goal(&Utc, now).unwrap();

        let views = evaluate(vec![goal], &[], &[], now);
        // Five days and almost twelve hours remain.
        assert_eq!(views[0].standing, GoalStanding::OnTrack { days: 6 });
        assert_eq!(views[0].standing_label, "6 days left");
    }

    #[test]
    fn validation_rules() {
        let now = Utc::now();
        let mut no_name = input(GoalUnit::Pages);
        no_name.name = " ".into();
        assert_eq!(classify(&no_name.into_goal(&Utc, now).unwrap_err()), ErrorKind::Validation);

        let mut no_deadline = input(GoalUnit::Pages);
        no_deadline.deadline = String::new();
        assert!(no_deadline.into_goal(&Utc, now).is_err());

        let mut bad_date = input(GoalUnit::Pages);
        bad_date.deadline = "31/12/2026".into();
        assert!(bad_date.into_goal(&Utc, now).is_err());

        let mut zero = input(GoalUnit::Books);
        zero.total = Some(0.0);
        assert!(zero.into_goal(&Utc, now).is_err());

        let mut missing = input(GoalUnit::Chapters);
        missing.total = None;
        assert!(missing.into_goal(&Utc, now).is_err());
    }

    fn scope() -> UserScope {
        Client::new(Arc::new(InMemoryStore::new())).user("u")
    }

    #[tokio::test]
    async fn chapters_bump_clamps_and_automated_is_rejected() {
        let me = scope();
        let added = create(&me, input(GoalUnit::Chapters), Duration::from_secs(2)).await.unwrap();
        assert_eq!(added.saved, Saved::Confirmed);

        assert_eq!(bump(&me, &added.id, 2.0).await.unwrap().current, 2.0);
        assert_eq!(bump(&me, &added.id, -5.0).await.unwrap().current, 0.0);
        let stored: Goal = me.get(&added.id).await.unwrap().unwrap();
        assert_eq!(stored.current, 0.0);

        let hours = create(&me, input(GoalUnit::Hours), Duration::from_secs(2)).await.unwrap();
        let err = bump(&me, &hours.id, 1.0).await.unwrap_err();
        assert_eq!(classify(&err), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn list_derives_progress_from_books_and_sessions() {
        let me = scope();
        let now = Utc::now();
        me.create(Goal {
            id: "g-books".into(),
            name: "Two books".into(),
            unit: GoalUnit::Books,
            current: 0.0,
            total: 2.0,
            deadline: Some(now + ChronoDuration::days(10)),
            created_at: Some(now - ChronoDuration::days(5)),
        })
        .await
        .unwrap();
        me.create(Goal {
            id: "g-hours".into(),
            name: "Read an hour".into(),
            unit: GoalUnit::Hours,
            current: 0.0,
            total: 1.0,
            deadline: Some(now + ChronoDuration::days(2)),
            created_at: Some(now - ChronoDuration::days(5)),
        })
        .await
        .unwrap();
        me.create(Book {
            id: "b1".into(),
            title: "Dune".into(),
            author: "Herbert".into(),
            status: BookStatus::Read,
            total_pages: 400,
            current_page: 400,
            finished_at: Some(now - ChronoDuration::days(1)),
            rating: 0,
            review: String::new(),
            created_at: None,
        })
        .await
        .unwrap();
        me.create(ReadingSession {
            id: String::new(),
            book_id: "b1".into(),
            book_title: "Dune".into(),
            duration_seconds: 3600,
            created_at: Some(now - ChronoDuration::hours(3)),
            device: Default::default(),
        })
        .await
        .unwrap();

        let views = list(&me, now).await.unwrap();
        assert_eq!(views.len(), 2);
        // Nearest deadline first.
        assert_eq!(views[0].goal.id, "g-hours");
        assert!(views[0].progress.completed);
        assert_eq!(views[0].standing, GoalStanding::Completed);
        assert_eq!(views[1].progress.current, 1.0);
        assert_eq!(views[1].progress.percent, 50.0);
        assert_eq!(views[1].standing, GoalStanding::OnTrack { days: 10 });
    }

    #[tokio::test]
    async fn delete_missing_goal_is_not_found() {
        let me = scope();
        assert_eq!(classify(&delete(&me, "nope").await.unwrap_err()), ErrorKind::NotFound);
        assert_eq!(classify(&bump(&me, "nope", 1.0).await.unwrap_err()), ErrorKind::NotFound);
    }
}
