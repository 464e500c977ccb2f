//! Goal-urgency notifications.
//!
//! [`NotificationManager`] looks at the user's goals, composes a reminder for
//! the nearest incomplete one, and hands it to a [`Dispatcher`]. The
//! dispatcher tries its channels in order (background-capable first) until
//! one accepts.
//!
//! Scheduled checks are throttled to one per local day through the
//! `last_notification_check_{userId}` setting. Demo mode skips the throttle
//! and re-checks on a short fixed interval; manual checks skip it without
//! recording.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use serde::Serialize;
use tokio::time::{interval_at, sleep, Instant};

use shelf_core::reminder::{compose, Reminder};

use crate::client::UserScope;
use crate::config::NotificationsConfig;
use crate::goals::fetch_snapshot;

pub const VIBRATION_PATTERN: [u32; 3] = [200, 100, 200];
pub const GOAL_ALERT_TAG: &str = "goal-alert";

/// Payload handed to a channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub vibrate: Vec<u32>,
    /// Replaces earlier notifications with the same tag. Unset in demo mode
    /// so every demo notification shows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl Notification {
    pub fn from_reminder(reminder: &Reminder, icon: &str, demo: bool) -> Self {
        Self {
            title: reminder.title.clone(),
            body: reminder.body.clone(),
            icon: icon.to_string(),
            vibrate: VIBRATION_PATTERN.to_vec(),
            tag: (!demo).then(|| GOAL_ALERT_TAG.to_string()),
        }
    }
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the channel can be tried at all right now.
    fn is_available(&self) -> bool {
        true
    }

    async fn deliver(&self, notification: &Notification) -> Result<()>;
}

/// Background-capable channel: POSTs the notification as JSON to a push
/// relay (ntfy, a service-worker gateway, ...).
pub struct WebhookChannel {
    url: String,
    http: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build webhook HTTP client")?;
        Ok(Self {
            url: url.into(),
            http,
        })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, notification: &Notification) -> Result<()> {
        self.http
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .with_context(|| format!("webhook request to {} failed", self.url))?
            .error_for_status()
            .context("webhook rejected notification")?;
        Ok(())
    }
}

/// Immediate channel: prints to stderr.
#[derive(Debug, Default)]
pub struct TerminalChannel;

#[async_trait]
impl NotificationChannel for TerminalChannel {
    fn name(&self) -> &str {
        "terminal"
    }

    async fn deliver(&self, notification: &Notification) -> Result<()> {
        let mut err = std::io::stderr().lock();
        writeln!(err, "\x07{}\n  {}", notification.title, notification.body)?;
        Ok(())
    }
}

/// Ordered channel fallback chain.
pub struct Dispatcher {
    channels: Vec<Box<dyn NotificationChannel>>,
}

impl Dispatcher {
    pub fn new(channels: Vec<Box<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    /// Webhook (when configured) then terminal.
    pub fn from_config(config: &NotificationsConfig) -> Result<Self> {
        let mut channels: Vec<Box<dyn NotificationChannel>> = Vec::new();
        if let Some(url) = &config.webhook_url {
            channels.push(Box::new(WebhookChannel::new(url.clone())?));
        }
        channels.push(Box::new(TerminalChannel));
        Ok(Self::new(channels))
    }

    /// Deliver through the first channel that accepts. Returns its name, or
    /// `None` when every channel failed or was unavailable.
    pub async fn dispatch(&self, notification: &Notification) -> Option<String> {
        for channel in &self.channels {
            if !channel.is_available() {
                tracing::debug!(channel = channel.name(), "notification channel unavailable");
                continue;
            }
            match channel.deliver(notification).await {
                Ok(()) => return Some(channel.name().to_string()),
                Err(e) => {
                    tracing::warn!(channel = channel.name(), error = %format!("{:#}", e), "notification channel failed");
                }
            }
        }
        None
    }
}

pub fn throttle_key(user_id: &str) -> String {
    format!("last_notification_check_{}", user_id)
}

/// Local calendar date as stored under the throttle key (`Mon Oct 19 2026`).
pub fn throttle_stamp<Tz: TimeZone>(now: &DateTime<Tz>) -> String {
    now.date_naive().format("%a %b %d %Y").to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckMode {
    /// Timer-driven; subject to the daily throttle unless in demo mode.
    Scheduled,
    /// User-requested test; never throttled, never recorded.
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckOutcome {
    Throttled,
    NothingPending,
    Delivered { channel: String, reminder: Reminder },
    Undelivered { reminder: Reminder },
}

pub struct NotificationManager {
    scope: UserScope,
    dispatcher: Dispatcher,
    demo: bool,
    icon: String,
    initial_delay: Duration,
    poll_interval: Duration,
    demo_interval: Duration,
}

impl NotificationManager {
    pub fn new(scope: UserScope, config: &NotificationsConfig, dispatcher: Dispatcher) -> Self {
        Self {
            scope,
            dispatcher,
            demo: config.demo,
            icon: config.icon.clone(),
            initial_delay: Duration::from_secs(config.initial_delay_secs),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            demo_interval: Duration::from_secs(config.demo_interval_secs),
        }
    }

    pub async fn check<Tz: TimeZone>(&self, mode: CheckMode, now: &DateTime<Tz>) -> Result<CheckOutcome> {
        let throttled = mode == CheckMode::Scheduled && !self.demo;
        let key = throttle_key(self.scope.user_id());
        let stamp = throttle_stamp(now);

        if throttled && self.scope.setting(&key).await?.as_deref() == Some(stamp.as_str()) {
            tracing::debug!("already notified today");
            return Ok(CheckOutcome::Throttled);
        }

        let snap = fetch_snapshot(&self.scope).await?;
        let Some(reminder) = compose(&snap.goals, &snap.books, &snap.sessions, now) else {
            tracing::debug!("no pending goals");
            return Ok(CheckOutcome::NothingPending);
        };

        let notification = Notification::from_reminder(&reminder, &self.icon, self.demo);
        let delivered = self.dispatcher.dispatch(&notification).await;

        if throttled {
            self.scope.set_setting(&key, &stamp).await?;
        }

        Ok(match delivered {
            Some(channel) => {
                tracing::info!(channel = %channel, goal = %reminder.goal_name, days_left = reminder.days_left, "goal reminder sent");
                CheckOutcome::Delivered { channel, reminder }
            }
            None => {
                tracing::warn!(goal = %reminder.goal_name, "no notification channel accepted the reminder");
                CheckOutcome::Undelivered { reminder }
            }
        })
    }

    async fn scheduled_check(&self) {
        if let Err(e) = self.check(CheckMode::Scheduled, &Local::now()).await {
            tracing::error!(error = %format!("{:#}", e), "notification check failed");
        }
    }

    /// Poll forever. Errors are logged and the loop keeps going.
    pub async fn run(&self) {
        let period = if self.demo {
            tracing::info!(interval_secs = self.demo_interval.as_secs(), "notification demo mode");
            self.demo_interval
        } else {
            sleep(self.initial_delay).await;
            self.scheduled_check().await;
            self.poll_interval
        };

        let mut ticks = interval_at(Instant::now() + period, period);
        loop {
            ticks.tick().await;
            self.scheduled_check().await;
        }
    }
}
