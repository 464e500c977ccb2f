//! TOML configuration.
//!
//! Only `[db]` is required; every other section has defaults.
//!
//! ```toml
//! [db]
//! path = "./data/shelf.sqlite"
//! watch_interval_ms = 500
//!
//! [user]
//! id = "local"
//!
//! [save]
//! book_timeout_ms = 3000
//! timeout_ms = 2000
//!
//! [stopwatch]
//! min_session_secs = 10
//! wake_lock_command = ["systemd-inhibit", "--what=idle", "sleep", "infinity"]
//!
//! [notifications]
//! demo = false
//! webhook_url = "https://ntfy.example/shelf"
//!
//! [server]
//! bind = "127.0.0.1:7341"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub user: UserConfig,
    #[serde(default)]
    pub save: SaveConfig,
    #[serde(default)]
    pub stopwatch: StopwatchConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    /// How often live queries check for writes made by other processes.
    #[serde(default = "default_watch_interval_ms")]
    pub watch_interval_ms: u64,
}

impl DbConfig {
    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }
}

fn default_watch_interval_ms() -> u64 {
    500
}

/// Identity supplied by the external identity provider.
#[derive(Debug, Deserialize, Clone)]
pub struct UserConfig {
    #[serde(default = "default_user_id")]
    pub id: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            id: default_user_id(),
        }
    }
}

fn default_user_id() -> String {
    "local".to_string()
}

/// Optimistic-save timeouts.
#[derive(Debug, Deserialize, Clone)]
pub struct SaveConfig {
    #[serde(default = "default_book_timeout_ms")]
    pub book_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            book_timeout_ms: default_book_timeout_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl SaveConfig {
    /// Timeout for the book-add form.
    pub fn book_timeout(&self) -> Duration {
        Duration::from_millis(self.book_timeout_ms)
    }

    /// Timeout for session and goal saves.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_book_timeout_ms() -> u64 {
    3000
}
fn default_timeout_ms() -> u64 {
    2000
}

#[derive(Debug, Deserialize, Clone)]
pub struct StopwatchConfig {
    /// Sessions shorter than this prompt for discard instead of saving.
    #[serde(default = "default_min_session_secs")]
    pub min_session_secs: u64,
    /// Command held running while the stopwatch ticks; unset means no wake-lock.
    #[serde(default)]
    pub wake_lock_command: Option<Vec<String>>,
}

impl Default for StopwatchConfig {
    fn default() -> Self {
        Self {
            min_session_secs: default_min_session_secs(),
            wake_lock_command: None,
        }
    }
}

fn default_min_session_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationsConfig {
    /// Bypass the daily throttle and re-check on a short fixed interval.
    #[serde(default)]
    pub demo: bool,
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_demo_interval_secs")]
    pub demo_interval_secs: u64,
    /// Background-capable channel; unset disables it.
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_icon")]
    pub icon: String,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            demo: false,
            initial_delay_secs: default_initial_delay_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            demo_interval_secs: default_demo_interval_secs(),
            webhook_url: None,
            icon: default_icon(),
        }
    }
}

fn default_initial_delay_secs() -> u64 {
    3
}
fn default_poll_interval_secs() -> u64 {
    3600
}
fn default_demo_interval_secs() -> u64 {
    10
}
fn default_icon() -> String {
    "icons/icon-192x192.png".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Config {
    /// A config pointing at `db_path` with every other section defaulted.
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
                watch_interval_ms: default_watch_interval_ms(),
            },
            user: UserConfig::default(),
            save: SaveConfig::default(),
            stopwatch: StopwatchConfig::default(),
            notifications: NotificationsConfig::default(),
            server: ServerConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.user.id.trim().is_empty() {
            anyhow::bail!("user.id must not be empty");
        }
        if self.db.watch_interval_ms == 0 {
            anyhow::bail!("db.watch_interval_ms must be > 0");
        }
        if self.save.book_timeout_ms == 0 || self.save.timeout_ms == 0 {
            anyhow::bail!("save timeouts must be > 0");
        }
        if self.stopwatch.min_session_secs == 0 {
            anyhow::bail!("stopwatch.min_session_secs must be >= 1");
        }
        if let Some(cmd) = &self.stopwatch.wake_lock_command {
            if cmd.is_empty() {
                anyhow::bail!("stopwatch.wake_lock_command must not be empty when set");
            }
        }
        let n = &self.notifications;
        if n.poll_interval_secs == 0 || n.demo_interval_secs == 0 {
            anyhow::bail!("notification intervals must be > 0");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
