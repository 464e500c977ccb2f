//! Optimistic-offline saves.
//!
//! A write is started on its own task and raced against a timeout. If the
//! backend has not acknowledged by then the caller carries on as if the
//! write succeeded; the task keeps running and the write lands whenever the
//! backend gets to it. Failures other than permission errors are logged and
//! likewise treated as queued.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use shelf_core::store::StoreError;

/// How a raced operation ended.
#[derive(Debug)]
pub enum SaveOutcome<T> {
    Acknowledged(T),
    TimedOut,
    Failed(anyhow::Error),
}

/// A save the caller must not treat as queued.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

/// What the caller may assume after [`save`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Saved {
    /// The backend acknowledged the write.
    Confirmed,
    /// Not acknowledged (timeout or transient failure); assumed queued.
    Queued,
}

/// Race `op` against `timeout`. The operation is spawned and never
/// cancelled, whatever the outcome.
pub async fn race<T, F>(op: F, timeout: Duration) -> SaveOutcome<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(op);
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(Ok(value))) => SaveOutcome::Acknowledged(value),
        Ok(Ok(Err(err))) => SaveOutcome::Failed(err),
        Ok(Err(join_err)) => SaveOutcome::Failed(anyhow::anyhow!("save task failed: {}", join_err)),
        Err(_) => SaveOutcome::TimedOut,
    }
}

/// Run `op` as an optimistic save named `what`.
pub async fn save<T, F>(what: &str, op: F, timeout: Duration) -> Result<Saved, SaveError>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    match race(op, timeout).await {
        SaveOutcome::Acknowledged(_) => {
            tracing::debug!(what, "save acknowledged");
            Ok(Saved::Confirmed)
        }
        SaveOutcome::TimedOut => {
            tracing::info!(
                what,
                timeout_ms = timeout.as_millis() as u64,
                "save not acknowledged in time; assuming queued"
            );
            Ok(Saved::Queued)
        }
        SaveOutcome::Failed(err) if StoreError::is_permission_denied(&err) => {
            tracing::warn!(what, error = %err, "save rejected");
            Err(SaveError::PermissionDenied(err.to_string()))
        }
        SaveOutcome::Failed(err) => {
            tracing::error!(what, error = %format!("{:#}", err), "save failed; assuming queued");
            Ok(Saved::Queued)
        }
    }
}
