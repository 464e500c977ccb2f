//! Library overview: books grouped into status tabs, plus today's and this
//! week's reading time.

use anyhow::Result;
use chrono::{DateTime, Local, TimeZone};
use serde::Serialize;

use shelf_core::models::{Book, BookStatus, ReadingSession};
use shelf_core::reading_stats::{format_short, start_of_week, ReadingTotals};

use crate::books::sort_newest_first;
use crate::client::{query, UserScope};
use crate::live::Subscription;

#[derive(Debug, Clone, Serialize)]
pub struct Tab {
    pub status: BookStatus,
    pub label: &'static str,
    pub books: Vec<Book>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LibraryView {
    pub tabs: Vec<Tab>,
    pub totals: ReadingTotals,
}

impl LibraryView {
    pub fn build<Tz: TimeZone>(mut books: Vec<Book>, sessions: &[ReadingSession], now: &DateTime<Tz>) -> Self {
        sort_newest_first(&mut books);
        let tabs = BookStatus::TABS
            .iter()
            .map(|status| Tab {
                status: *status,
                label: status.label(),
                books: books.iter().filter(|b| b.status == *status).cloned().collect(),
            })
            .collect();
        Self {
            tabs,
            totals: ReadingTotals::compute(sessions, now),
        }
    }
}

fn week_sessions<Tz: TimeZone>(now: &DateTime<Tz>) -> shelf_core::query::Query {
    query::<ReadingSession>().where_gte("createdAt", shelf_core::models::format_timestamp(&start_of_week(now)))
}

pub async fn snapshot<Tz: TimeZone>(scope: &UserScope, now: &DateTime<Tz>) -> Result<LibraryView> {
    let books: Vec<Book> = scope.fetch(&query::<Book>()).await?;
    let sessions: Vec<ReadingSession> = scope.fetch(&week_sessions(now)).await?;
    Ok(LibraryView::build(books, &sessions, now))
}

/// Live library view, rebuilt whenever books or sessions change.
pub struct LibraryWatch {
    books: Subscription<Book>,
    sessions: Subscription<ReadingSession>,
    latest_books: Vec<Book>,
    latest_sessions: Vec<ReadingSession>,
    books_primed: bool,
    sessions_primed: bool,
}

impl LibraryWatch {
    pub fn new(scope: &UserScope) -> Self {
        Self {
            books: scope.subscribe(query::<Book>()),
            sessions: scope.subscribe(week_sessions(&Local::now())),
            latest_books: Vec::new(),
            latest_sessions: Vec::new(),
            books_primed: false,
            sessions_primed: false,
        }
    }

    /// Next view. Cancel-safe, as the underlying subscriptions are.
    pub async fn next(&mut self) -> Result<LibraryView> {
        let priming = !(self.books_primed && self.sessions_primed);
        if !self.books_primed {
            self.latest_books = self.books.next().await?;
            self.books_primed = true;
        }
        if !self.sessions_primed {
            self.latest_sessions = self.sessions.next().await?;
            self.sessions_primed = true;
        }
        if !priming {
            tokio::select! {
                books = self.books.next() => self.latest_books = books?,
                sessions = self.sessions.next() => self.latest_sessions = sessions?,
            }
        }
        Ok(LibraryView::build(
            self.latest_books.clone(),
            &self.latest_sessions,
            &Local::now(),
        ))
    }
}

pub fn print_view(view: &LibraryView) {
    println!(
        "Today: {}   This week: {}",
        format_short(view.totals.today_seconds),
        format_short(view.totals.week_seconds)
    );
    for tab in &view.tabs {
        println!();
        println!("{} ({})", tab.label, tab.books.len());
        if tab.books.is_empty() {
            println!("  (no books)");
        }
        for book in &tab.books {
            println!(
                "  {}  {} by {}  {}/{} ({}%)",
                book.id,
                book.title,
                book.author,
                book.current_page,
                book.total_pages,
                book.percent_read()
            );
        }
    }
}

/// `shelf library [--watch]`.
pub async fn run_library(scope: &UserScope, watch: bool) -> Result<()> {
    if !watch {
        print_view(&snapshot(scope, &Local::now()).await?);
        return Ok(());
    }

    let mut live = LibraryWatch::new(scope);
    loop {
        tokio::select! {
            view = live.next() => {
                print_view(&view?);
                println!("---");
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use chrono::{Duration, Utc};
    use shelf_core::store::memory::InMemoryStore;
    use std::sync::Arc;

    fn book(title: &str, status: BookStatus) -> Book {
        Book {
            id: String::new(),
            title: title.into(),
            author: "A".into(),
            status,
            total_pages: 100,
            current_page: 0,
            finished_at: None,
            rating: 0,
            review: String::new(),
            created_at: Some(Utc::now()),
        }
    }

    fn session(secs: u64, at: DateTime<chrono::Utc>) -> ReadingSession {
        ReadingSession {
            id: String::new(),
            book_id: "b".into(),
            book_title: "t".into(),
            duration_seconds: secs,
            created_at: Some(at),
            device: Default::default(),
        }
    }

    #[tokio::test]
    async fn snapshot_groups_tabs_and_sums_today() {
        let me = Client::new(Arc::new(InMemoryStore::new())).user("u");
        me.create(book("A", BookStatus::Reading)).await.unwrap();
        me.create(book("B", BookStatus::ToRead)).await.unwrap();
        me.create(book("C", BookStatus::ToRead)).await.unwrap();
        let now = Local::now();
        me.create(session(600, now.with_timezone(&Utc))).await.unwrap();
        me.create(session(900, (now - Duration::days(60)).with_timezone(&Utc))).await.unwrap();

        let view = snapshot(&me, &now).await.unwrap();
        let counts: Vec<(BookStatus, usize)> = view.tabs.iter().map(|t| (t.status, t.books.len())).collect();
        assert_eq!(
            counts,
            vec![(BookStatus::Reading, 1), (BookStatus::ToRead, 2), (BookStatus::Read, 0)]
        );
        assert_eq!(view.totals.today_seconds, 600);
        assert_eq!(view.totals.week_seconds, 600);
    }

    #[tokio::test]
    async fn watch_rebuilds_on_change() {
        let me = Client::new(Arc::new(InMemoryStore::new())).user("u");
        let mut live = LibraryWatch::new(&me);
        let first = live.next().await.unwrap();
        assert!(first.tabs.iter().all(|t| t.books.is_empty()));

        me.create(book("Dune", BookStatus::Reading)).await.unwrap();
        let second = live.next().await.unwrap();
        assert_eq!(second.tabs[0].books.len(), 1);
        assert_eq!(second.tabs[0].books[0].title, "Dune");
    }

    #[tokio::test]
    async fn watch_keeps_both_collections_current() {
        let me = Client::new(Arc::new(InMemoryStore::new())).user("u");
        let mut live = LibraryWatch::new(&me);
        live.next().await.unwrap();

        me.create(book("Dune", BookStatus::Reading)).await.unwrap();
        me.create(session(600, Utc::now())).await.unwrap();

        let mut view = live.next().await.unwrap();
        for _ in 0..2 {
            if !view.tabs[0].books.is_empty() && view.totals.today_seconds == 600 {
                break;
            }
            view = tokio::time::timeout(std::time::Duration::from_secs(1), live.next())
                .await
                .expect("a write was dropped")
                .unwrap();
        }
        assert_eq!(view.tabs[0].books.len(), 1);
        assert_eq!(view.totals.today_seconds, 600);
    }
}
