//! Book commands: the add form, the per-status list, the page-progress
//! editor, and delete.

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use shelf_core::models::{Book, BookStatus, Record};
use shelf_core::status::ProgressUpdate;
use shelf_core::store::StoreError;

use crate::client::{new_id, query, UserScope};
use crate::error::invalid;
use crate::optimistic::{self, Saved};

/// Raw add-form input. `totalPages` accepts a number or a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub total_pages: Value,
    #[serde(default)]
    pub status: Option<BookStatus>,
}

fn parse_pages(value: &Value) -> Result<u32> {
    let pages = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match pages {
        Some(p) if p.fract() == 0.0 && p > 0.0 && p <= u32::MAX as f64 => Ok(p as u32),
        Some(_) => Err(invalid("page count must be a whole number greater than 0")),
        None => Err(invalid("page count is required and must be a number")),
    }
}

impl BookInput {
    /// Validate and build the record to store. `finishedAt` is never set
    /// here, even for a book created as Read.
    pub fn into_book(self, now: DateTime<Utc>) -> Result<Book> {
        let title = self.title.trim();
        let author = self.author.trim();
        if title.is_empty() {
            return Err(invalid("title is required"));
        }
        if author.is_empty() {
            return Err(invalid("author is required"));
        }
        let total_pages = parse_pages(&self.total_pages)?;

        Ok(Book {
            id: String::new(),
            title: title.to_string(),
            author: author.to_string(),
            status: self.status.unwrap_or(BookStatus::ToRead),
            total_pages,
            current_page: 0,
            finished_at: None,
            rating: 0,
            review: String::new(),
            created_at: Some(now),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Added {
    pub id: String,
    pub saved: Saved,
}

/// Validate `input` and store it as an optimistic save.
pub async fn add(scope: &UserScope, input: BookInput, timeout: Duration) -> Result<Added> {
    let mut book = input.into_book(Utc::now())?;
    let id = new_id();
    book.set_id(id.clone());

    tracing::info!(id = %id, title = %book.title, "adding book");
    let writer = scope.clone();
    let saved = optimistic::save("book", async move { writer.create(book).await }, timeout).await?;
    Ok(Added { id, saved })
}

/// Books with `status`, or every book. Newest first; undated books last.
pub async fn list(scope: &UserScope, status: Option<BookStatus>) -> Result<Vec<Book>> {
    let q = match status {
        Some(s) => query::<Book>().where_eq("status", s.as_str()),
        None => query::<Book>(),
    };
    let mut books: Vec<Book> = scope.fetch(&q).await?;
    sort_newest_first(&mut books);
    Ok(books)
}

pub(crate) fn sort_newest_first(books: &mut [Book]) {
    books.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

async fn require(scope: &UserScope, id: &str) -> Result<Book> {
    scope
        .get::<Book>(id)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("book {}", id)).into())
}

/// Save the progress editor: clamp the page, derive the status, stamp the
/// completion date on the edge into Read.
pub async fn update_progress(
    scope: &UserScope,
    id: &str,
    requested_page: i64,
    now: DateTime<Utc>,
) -> Result<Book> {
    let mut book = require(scope, id).await?;
    let update = ProgressUpdate::plan(&book, requested_page, now);

    scope.update::<Book>(id, update.to_fields()).await?;
    if update.status != book.status {
        tracing::info!(id, from = %book.status, to = %update.status, "book status changed");
    }
    update.apply(&mut book);
    Ok(book)
}

pub async fn delete(scope: &UserScope, id: &str) -> Result<()> {
    require(scope, id).await?;
    scope.delete::<Book>(id).await?;
    tracing::info!(id, "deleted book");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use crate::error::{classify, ErrorKind};
    use serde_json::json;
    use shelf_core::store::memory::InMemoryStore;
    use std::sync::Arc;

    fn scope() -> UserScope {
        Client::new(Arc::new(InMemoryStore::new())).user("reader")
    }

    fn input(title: &str, pages: Value) -> BookInput {
        BookInput {
            title: title.to_string(),
            author: "Frank Herbert".to_string(),
            total_pages: pages,
            status: None,
        }
    }

    #[test]
    fn validation_rules() {
        let now = Utc::now();
        assert!(input("", json!(10)).into_book(now).is_err());
        assert!(input("Dune", json!(0)).into_book(now).is_err());
        assert!(input("Dune", json!(-3)).into_book(now).is_err());
        assert!(input("Dune", json!("abc")).into_book(now).is_err());
        assert!(input("Dune", Value::Null).into_book(now).is_err());

        let mut no_author = input("Dune", json!(10));
        no_author.author = "  ".into();
        assert_eq!(classify(&no_author.into_book(now).unwrap_err()), ErrorKind::Validation);

        let book = input("  Dune ", json!("412")).into_book(now).unwrap();
        assert_eq!(book.title, "Dune");
        assert_eq!(book.total_pages, 412);
        assert_eq!(book.status, BookStatus::ToRead);
        assert_eq!(book.current_page, 0);
        assert_eq!(book.created_at, Some(now));
    }

    #[test]
    fn created_as_read_has_no_completion_date() {
        let mut i = input("Emma", json!(300));
        i.status = Some(BookStatus::Read);
        let book = i.into_book(Utc::now()).unwrap();
        assert_eq!(book.status, BookStatus::Read);
        assert!(book.finished_at.is_none());
    }

    #[tokio::test]
    async fn add_list_progress_delete() {
        let me = scope();
        let added = add(&me, input("Dune", json!(100)), Duration::from_secs(3)).await.unwrap();
        assert_eq!(added.saved, Saved::Confirmed);

        let to_read = list(&me, Some(BookStatus::ToRead)).await.unwrap();
        assert_eq!(to_read.len(), 1);
        assert_eq!(to_read[0].id, added.id);

        let now = Utc::now();
        let book = update_progress(&me, &added.id, 40, now).await.unwrap();
        assert_eq!(book.status, BookStatus::Reading);
        assert!(list(&me, Some(BookStatus::ToRead)).await.unwrap().is_empty());

        let book = update_progress(&me, &added.id, 500, now).await.unwrap();
        assert_eq!(book.current_page, 100);
        assert_eq!(book.status, BookStatus::Read);
        assert_eq!(book.finished_at, Some(now));

        // Saving again while Read keeps the original completion date.
        let later = now + chrono::Duration::days(2);
        update_progress(&me, &added.id, 100, later).await.unwrap();
        let stored: Book = me.get(&added.id).await.unwrap().unwrap();
        assert_eq!(
            stored.finished_at.map(|t| t.timestamp_millis()),
            Some(now.timestamp_millis())
        );

        delete(&me, &added.id).await.unwrap();
        assert!(list(&me, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_book_is_not_found() {
        let me = scope();
        let err = update_progress(&me, "nope", 3, Utc::now()).await.unwrap_err();
        assert_eq!(classify(&err), ErrorKind::NotFound);
        assert_eq!(classify(&delete(&me, "nope").await.unwrap_err()), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn add_on_read_only_store_is_permission_denied() {
        let store = Arc::new(InMemoryStore::new());
        store.set_read_only(true);
        let me = Client::new(store).user("reader");
        let err = add(&me, input("Dune", json!(10)), Duration::from_secs(3))
            .await
            .unwrap_err();
        assert_eq!(classify(&err), ErrorKind::PermissionDenied);
    }
}
