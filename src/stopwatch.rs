//! Reading stopwatch.
//!
//! [`Stopwatch`] is the bare state machine (Idle ⇄ Running, one tick per
//! second). [`Driver`] runs it in real time: a ticker task advances the
//! count, a wake-lock is held while running, and stopping persists a
//! `readingSessions` record as an optimistic save.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

use shelf_core::models::{Book, Device, ReadingSession, UNKNOWN_BOOK_TITLE};

use crate::client::{new_id, UserScope};
use crate::error::invalid;
use crate::optimistic::{self, Saved};
use crate::wakelock::WakeLock;

/// The book being timed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedBook {
    pub id: String,
    pub title: String,
}

/// What the caller should do after [`Stopwatch::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDecision {
    /// Too short to be worth keeping; ask before saving.
    ConfirmDiscard { elapsed: u64 },
    Save { elapsed: u64 },
}

#[derive(Debug)]
pub struct Stopwatch {
    book: Option<SelectedBook>,
    running: bool,
    elapsed: u64,
    min_session_secs: u64,
}

impl Stopwatch {
    pub fn new(min_session_secs: u64) -> Self {
        Self {
            book: None,
            running: false,
            elapsed: 0,
            min_session_secs,
        }
    }

    pub fn select(&mut self, book: Option<SelectedBook>) {
        self.book = book;
    }

    pub fn book(&self) -> Option<&SelectedBook> {
        self.book.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }

    pub fn start(&mut self) -> Result<()> {
        if self.book.is_none() {
            return Err(invalid("select a book before starting the stopwatch"));
        }
        self.running = true;
        Ok(())
    }

    pub fn tick(&mut self) {
        if self.running {
            self.elapsed += 1;
        }
    }

    pub fn stop(&mut self) -> StopDecision {
        self.running = false;
        if self.elapsed < self.min_session_secs {
            StopDecision::ConfirmDiscard {
                elapsed: self.elapsed,
            }
        } else {
            StopDecision::Save {
                elapsed: self.elapsed,
            }
        }
    }

    /// Back to Idle with a zero count. The selected book is kept.
    pub fn reset(&mut self) {
        self.running = false;
        self.elapsed = 0;
    }
}

/// A session as posted by a client that ran its own stopwatch.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInput {
    #[serde(default)]
    pub book_id: String,
    #[serde(default)]
    pub duration_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recorded {
    pub id: String,
    pub duration_seconds: u64,
    pub saved: Saved,
}

/// Title snapshot for `book_id`, or the unknown-book placeholder.
pub async fn book_title(scope: &UserScope, book_id: &str) -> Result<String> {
    Ok(scope
        .get::<Book>(book_id)
        .await?
        .map(|b| b.title)
        .unwrap_or_else(|| UNKNOWN_BOOK_TITLE.to_string()))
}

/// Persist one finished session as an optimistic save.
pub async fn record_session(
    scope: &UserScope,
    book: &SelectedBook,
    duration_seconds: u64,
    device: Device,
    timeout: Duration,
) -> Result<Recorded> {
    let id = new_id();
    let session = ReadingSession {
        id: id.clone(),
        book_id: book.id.clone(),
        book_title: book.title.clone(),
        duration_seconds,
        created_at: Some(Utc::now()),
        device,
    };
    tracing::info!(id = %id, book_id = %book.id, duration_seconds, "recording reading session");

    let writer = scope.clone();
    let saved = optimistic::save("reading session", async move { writer.create(session).await }, timeout).await?;
    Ok(Recorded {
        id,
        duration_seconds,
        saved,
    })
}

/// Record a session posted by a client.
pub async fn log_session(scope: &UserScope, input: SessionInput, device: Device, timeout: Duration) -> Result<Recorded> {
    let book_id = input.book_id.trim();
    if book_id.is_empty() {
        return Err(invalid("bookId is required"));
    }
    let book = SelectedBook {
        id: book_id.to_string(),
        title: book_title(scope, book_id).await?,
    };
    record_session(scope, &book, input.duration_seconds, device, timeout).await
}

/// Real-time stopwatch bound to a user.
pub struct Driver {
    scope: UserScope,
    state: Arc<Mutex<Stopwatch>>,
    ticker: Option<JoinHandle<()>>,
    wake_lock: Box<dyn WakeLock>,
    device: Device,
    save_timeout: Duration,
}

impl Driver {
    pub fn new(
        scope: UserScope,
        min_session_secs: u64,
        wake_lock: Box<dyn WakeLock>,
        device: Device,
        save_timeout: Duration,
    ) -> Self {
        Self {
            scope,
            state: Arc::new(Mutex::new(Stopwatch::new(min_session_secs))),
            ticker: None,
            wake_lock,
            device,
            save_timeout,
        }
    }

    /// Select the book to time. The title snapshot is taken now.
    pub async fn select_book(&self, book_id: &str) -> Result<()> {
        let title = book_title(&self.scope, book_id).await?;
        self.state.lock().await.select(Some(SelectedBook {
            id: book_id.to_string(),
            title,
        }));
        Ok(())
    }

    pub async fn elapsed(&self) -> u64 {
        self.state.lock().await.elapsed()
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.is_running()
    }

    pub fn wake_lock_held(&self) -> bool {
        self.wake_lock.is_held()
    }

    pub async fn start(&mut self) -> Result<()> {
        self.state.lock().await.start()?;
        if self.ticker.is_none() {
            let state = self.state.clone();
            self.ticker = Some(tokio::spawn(async move {
                let period = Duration::from_secs(1);
                let mut ticks = interval_at(Instant::now() + period, period);
                loop {
                    ticks.tick().await;
                    state.lock().await.tick();
                }
            }));
        }
        if let Err(e) = self.wake_lock.acquire().await {
            tracing::warn!(error = %e, "wake-lock unavailable");
        }
        Ok(())
    }

    async fn halt(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        if let Err(e) = self.wake_lock.release().await {
            tracing::warn!(error = %e, "failed to release wake-lock");
        }
    }

    /// Stop ticking and release the wake-lock. Nothing is saved yet.
    pub async fn stop(&mut self) -> StopDecision {
        self.halt().await;
        self.state.lock().await.stop()
    }

    /// Persist the stopped session. The count resets unless the save was
    /// rejected outright.
    pub async fn save(&mut self) -> Result<Recorded> {
        let (book, elapsed) = {
            let state = self.state.lock().await;
            let book = state
                .book()
                .cloned()
                .ok_or_else(|| invalid("select a book before saving a session"))?;
            (book, state.elapsed())
        };
        let recorded = record_session(&self.scope, &book, elapsed, self.device, self.save_timeout).await?;
        self.state.lock().await.reset();
        Ok(recorded)
    }

    /// Drop the current count without saving.
    pub async fn reset(&mut self) {
        self.halt().await;
        self.state.lock().await.reset();
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{query, Client};
    use crate::error::{classify, ErrorKind};
    use crate::wakelock::NoWakeLock;
    use shelf_core::models::BookStatus;
    use shelf_core::store::memory::InMemoryStore;

    fn selected() -> Option<SelectedBook> {
        Some(SelectedBook {
            id: "b1".into(),
            title: "Dune".into(),
        })
    }

    #[test]
    fn start_without_book_is_rejected() {
        let mut sw = Stopwatch::new(10);
        let err = sw.start().unwrap_err();
        assert_eq!(classify(&err), ErrorKind::Validation);
        assert!(!sw.is_running());
    }

    #[test]
    fn short_sessions_ask_before_saving() {
        let mut sw = Stopwatch::new(10);
        sw.select(selected());
        sw.start().unwrap();
        for _ in 0..9 {
            sw.tick();
        }
        assert_eq!(sw.stop(), StopDecision::ConfirmDiscard { elapsed: 9 });

        sw.start().unwrap();
        sw.tick();
        assert_eq!(sw.stop(), StopDecision::Save { elapsed: 10 });
    }

    #[test]
    fn ticks_only_count_while_running() {
        let mut sw = Stopwatch::new(10);
        sw.select(selected());
        sw.tick();
        assert_eq!(sw.elapsed(), 0);
        sw.start().unwrap();
        sw.tick();
        sw.reset();
        assert_eq!(sw.elapsed(), 0);
        assert!(!sw.is_running());
        assert!(sw.book().is_some());
    }

    async fn driver() -> (UserScope, Driver) {
        let me = Client::new(Arc::new(InMemoryStore::new())).user("u");
        me.create(Book {
            id: "b1".into(),
            title: "Dune".into(),
            author: "Herbert".into(),
            status: BookStatus::Reading,
            total_pages: 400,
            current_page: 20,
            finished_at: None,
            rating: 0,
            review: String::new(),
            created_at: None,
        })
        .await
        .unwrap();
        let d = Driver::new(
            me.clone(),
            10,
            Box::new(NoWakeLock::default()),
            Device::Mobile,
            Duration::from_secs(2),
        );
        (me, d)
    }

    #[tokio::test(start_paused = true)]
    async fn stop_after_twelve_seconds_persists_session() {
        let (me, mut d) = driver().await;
        d.select_book("b1").await.unwrap();
        d.start().await.unwrap();
        assert!(d.wake_lock_held());

        tokio::time::sleep(Duration::from_millis(12_500)).await;
        let decision = d.stop().await;
        assert_eq!(decision, StopDecision::Save { elapsed: 12 });
        assert!(!d.wake_lock_held());

        let recorded = d.save().await.unwrap();
        assert_eq!(recorded.duration_seconds, 12);
        assert_eq!(d.elapsed().await, 0);

        let sessions: Vec<ReadingSession> = me.fetch(&query::<ReadingSession>()).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].duration_seconds, 12);
        assert_eq!(sessions[0].book_id, "b1");
        assert_eq!(sessions[0].book_title, "Dune");
        assert_eq!(sessions[0].device, Device::Mobile);
        assert!(sessions[0].created_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_at_nine_seconds_prompts_discard() {
        let (me, mut d) = driver().await;
        d.select_book("b1").await.unwrap();
        d.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(9_500)).await;

        assert_eq!(d.stop().await, StopDecision::ConfirmDiscard { elapsed: 9 });
        d.reset().await;
        assert_eq!(d.elapsed().await, 0);
        assert!(me.fetch::<ReadingSession>(&query::<ReadingSession>()).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_clock_does_not_advance() {
        let (_, mut d) = driver().await;
        d.select_book("b1").await.unwrap();
        d.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        d.stop().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(d.elapsed().await, 3);
    }

    #[tokio::test]
    async fn unknown_book_gets_placeholder_title() {
        let (me, _) = driver().await;
        assert_eq!(book_title(&me, "missing").await.unwrap(), UNKNOWN_BOOK_TITLE);
        let rec = log_session(
            &me,
            SessionInput {
                book_id: "missing".into(),
                duration_seconds: 300,
            },
            Device::Desktop,
            Duration::from_secs(2),
        )
        .await
        .unwrap();
        assert_eq!(rec.saved, Saved::Confirmed);
        let stored: ReadingSession = me.get(&rec.id).await.unwrap().unwrap();
        assert_eq!(stored.book_title, UNKNOWN_BOOK_TITLE);
    }
}
