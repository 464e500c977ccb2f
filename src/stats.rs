//! Reading-time statistics: recent sessions and the history chart.

use anyhow::Result;
use chrono::{DateTime, Local, TimeZone};
use serde::Serialize;

use shelf_core::models::{format_timestamp, ReadingSession};
use shelf_core::query::Direction;
use shelf_core::reading_stats::{chart, format_clock, format_short, history_start, ChartPoint, Period};

use crate::client::{query, UserScope};

/// Sessions shown in the "recent" list.
pub const RECENT_LIMIT: usize = 5;

pub async fn recent_sessions(scope: &UserScope) -> Result<Vec<ReadingSession>> {
    scope
        .fetch(
            &query::<ReadingSession>()
                .order_by("createdAt", Direction::Desc)
                .limit(RECENT_LIMIT),
        )
        .await
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsView {
    pub period: Period,
    pub total_seconds: u64,
    pub points: Vec<ChartPoint>,
}

/// Chart over the last six months of sessions.
pub async fn history<Tz: TimeZone>(scope: &UserScope, period: Period, now: &DateTime<Tz>) -> Result<StatsView> {
    let since = format_timestamp(&history_start(now));
    let sessions: Vec<ReadingSession> = scope
        .fetch(&query::<ReadingSession>().where_gte("createdAt", since))
        .await?;
    let points = chart(&sessions, period, now);
    Ok(StatsView {
        period,
        total_seconds: points.iter().map(|p| p.seconds).sum(),
        points,
    })
}

/// `shelf stats`.
pub async fn run_stats(scope: &UserScope, period: Period) -> Result<()> {
    let view = history(scope, period, &Local::now()).await?;

    println!("Reading time by {}", view.period);
    println!("=====================");
    if view.points.is_empty() {
        println!("  No reading sessions yet.");
        return Ok(());
    }
    for point in &view.points {
        let bar = "#".repeat((point.height_percent / 5) as usize);
        println!(
            "  {:>5}  {:<16} {:>8}  {}",
            point.label,
            point.range,
            format_short(point.seconds),
            bar
        );
    }
    println!();
    println!("  Total: {}", format_short(view.total_seconds));
    Ok(())
}

/// `shelf session recent`.
pub async fn run_recent(scope: &UserScope) -> Result<()> {
    let sessions = recent_sessions(scope).await?;
    if sessions.is_empty() {
        println!("No reading sessions yet.");
        return Ok(());
    }
    for s in sessions {
        let when = s
            .created_at
            .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!("{}  {}  {}  ({:?})", when, format_clock(s.duration_seconds), s.book_title, s.device);
    }
    Ok(())
}
