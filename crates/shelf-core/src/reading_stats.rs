//! Reading-time aggregation over session records.
//!
//! Two consumers: the library header (seconds read today and this week)
//! and the stopwatch history chart (per-day, per-week, and per-month
//! buckets). Day boundaries are local midnights in the caller's time zone;
//! weeks start on Sunday.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;

use crate::models::ReadingSession;

/// The UTC instant of local midnight on `date`.
///
/// Falls back to treating the wall-clock time as UTC when midnight does
/// not exist in `tz` (DST gap).
pub fn local_midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

/// Local midnight of the Sunday starting the week that contains `now`.
pub fn start_of_week<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    let today = now.date_naive();
    let back = now.weekday().num_days_from_sunday() as i64;
    local_midnight(&now.timezone(), today - Duration::days(back))
}

/// Start of the history shown in charts: six calendar months back.
pub fn history_start<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    let now_utc = now.with_timezone(&Utc);
    now_utc
        .checked_sub_months(Months::new(6))
        .unwrap_or(now_utc - Duration::days(183))
}

/// Seconds read today and this week.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReadingTotals {
    pub today_seconds: u64,
    pub week_seconds: u64,
}

impl ReadingTotals {
    pub fn compute<Tz: TimeZone>(sessions: &[ReadingSession], now: &DateTime<Tz>) -> Self {
        let day_start = local_midnight(&now.timezone(), now.date_naive());
        let week_start = start_of_week(now);

        let mut totals = ReadingTotals::default();
        for session in sessions {
            let Some(created) = session.created_at else {
                continue;
            };
            if created >= week_start {
                totals.week_seconds += session.duration_seconds;
            }
            if created >= day_start {
                totals.today_seconds += session.duration_seconds;
            }
        }
        totals
    }
}

/// Chart granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[default]
    Days,
    Weeks,
    Months,
}

impl FromStr for Period {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "days" | "day" | "d" => Ok(Period::Days),
            "weeks" | "week" | "w" => Ok(Period::Weeks),
            "months" | "month" | "m" => Ok(Period::Months),
            other => anyhow::bail!(
                "invalid period: '{}'. Must be days, weeks, or months.",
                other
            ),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Period::Days => "days",
            Period::Weeks => "weeks",
            Period::Months => "months",
        })
    }
}

/// One bar of the history chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartPoint {
    /// Short axis label (`M`, `Wk 2`, `O`).
    pub label: String,
    /// Human-readable span of the bucket.
    pub range: String,
    pub seconds: u64,
    /// Bar height relative to the tallest bucket, 0..=100.
    pub height_percent: u32,
}

struct Bucket {
    label: String,
    range: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

/// Build the chart for `period`. Empty when there is no history at all.
///
/// - days: the last 7 local days, today last
/// - weeks: 4 rolling 7-day windows ending at `now - 7i days`
/// - months: the last 6 calendar months, this month last
pub fn chart<Tz: TimeZone>(
    sessions: &[ReadingSession],
    period: Period,
    now: &DateTime<Tz>,
) -> Vec<ChartPoint> {
    if sessions.is_empty() {
        return Vec::new();
    }

    let tz = now.timezone();
    let today = now.date_naive();
    let mut buckets = Vec::new();

    match period {
        Period::Days => {
            for i in (0..=6).rev() {
                let day = today - Duration::days(i);
                buckets.push(Bucket {
                    label: first_letter(&day.format("%a").to_string()),
                    range: day.format("%b %-d").to_string(),
                    start: local_midnight(&tz, day),
                    end: local_midnight(&tz, day + Duration::days(1)),
                });
            }
        }
        Period::Weeks => {
            let now_utc = now.with_timezone(&Utc);
            for i in (0..=3).rev() {
                let end = now_utc - Duration::days(7 * i);
                let start = end - Duration::days(7);
                let (s, e) = (start.with_timezone(&tz), end.with_timezone(&tz));
                buckets.push(Bucket {
                    label: format!("Wk {}", 4 - i),
                    range: format!("{}/{} - {}/{}", s.day(), s.month(), e.day(), e.month()),
                    start,
                    end,
                });
            }
        }
        Period::Months => {
            let this_month = today.with_day(1).unwrap_or(today);
            for i in (0..=5).rev() {
                let first = this_month
                    .checked_sub_months(Months::new(i))
                    .unwrap_or(this_month);
                let next = first.checked_add_months(Months::new(1)).unwrap_or(first);
                buckets.push(Bucket {
                    label: first_letter(&first.format("%b").to_string()),
                    range: first.format("%B %Y").to_string(),
                    start: local_midnight(&tz, first),
                    end: local_midnight(&tz, next),
                });
            }
        }
    }

    let totals: Vec<u64> = buckets
        .iter()
        .map(|b| {
            sessions
                .iter()
                .filter(|s| {
                    s.created_at
                        .map(|t| t >= b.start && t < b.end)
                        .unwrap_or(false)
                })
                .map(|s| s.duration_seconds)
                .sum()
        })
        .collect();

    let max = totals.iter().copied().max().unwrap_or(0).max(1);

    buckets
        .into_iter()
        .zip(totals)
        .map(|(b, seconds)| ChartPoint {
            label: b.label,
            range: b.range,
            seconds,
            height_percent: ((seconds as f64 / max as f64) * 100.0).round() as u32,
        })
        .collect()
}

fn first_letter(s: &str) -> String {
    s.chars().take(1).collect()
}

/// `HH:MM:SS`, hours not capped at 24.
pub fn format_clock(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Compact duration: `1h 5m`, `12m`, or `40s`.
pub fn format_short(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", total_seconds)
    }
}
