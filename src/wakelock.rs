//! Screen/idle wake-lock held while the stopwatch runs.
//!
//! Failures to acquire or release are logged and otherwise ignored; a
//! missing wake-lock never stops a reading session.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::{Child, Command};

use crate::config::StopwatchConfig;

#[async_trait]
pub trait WakeLock: Send + Sync {
    async fn acquire(&mut self) -> Result<()>;

    async fn release(&mut self) -> Result<()>;

    fn is_held(&self) -> bool;
}

/// Wake-lock that does nothing but remember its state.
#[derive(Debug, Default)]
pub struct NoWakeLock {
    held: bool,
}

#[async_trait]
impl WakeLock for NoWakeLock {
    async fn acquire(&mut self) -> Result<()> {
        self.held = true;
        Ok(())
    }

    async fn release(&mut self) -> Result<()> {
        self.held = false;
        Ok(())
    }

    fn is_held(&self) -> bool {
        self.held
    }
}

/// Keeps an inhibitor process (e.g. `systemd-inhibit ... sleep infinity`)
/// alive while held; release kills it.
pub struct CommandWakeLock {
    command: Vec<String>,
    child: Option<Child>,
}

impl CommandWakeLock {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            child: None,
        }
    }
}

#[async_trait]
impl WakeLock for CommandWakeLock {
    async fn acquire(&mut self) -> Result<()> {
        if self.child.is_some() {
            return Ok(());
        }
        let (program, args) = self
            .command
            .split_first()
            .context("wake-lock command is empty")?;
        let child = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn wake-lock command '{}'", program))?;
        self.child = Some(child);
        Ok(())
    }

    async fn release(&mut self) -> Result<()> {
        if let Some(mut child) = self.child.take() {
            child.kill().await.context("failed to stop wake-lock command")?;
        }
        Ok(())
    }

    fn is_held(&self) -> bool {
        self.child.is_some()
    }
}

pub fn from_config(config: &StopwatchConfig) -> Box<dyn WakeLock> {
    match &config.wake_lock_command {
        Some(command) => Box::new(CommandWakeLock::new(command.clone())),
        None => Box::new(NoWakeLock::default()),
    }
}
