//! Book status derivation for the page-progress editor.
//!
//! Status is a function of the new page, the page count, and the previous
//! status. Rules, first match wins:
//!
//! 1. `page >= total` → Read (stamp completion only when not already Read)
//! 2. previous To-Read and `0 < page < total` → Reading
//! 3. `page == 0` and previous Reading → To-Read
//! 4. otherwise unchanged

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::models::{format_timestamp, Book, BookStatus};

/// Result of [`derive_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub status: BookStatus,
    /// True only on the edge into Read.
    pub stamp_completion: bool,
}

/// Derive the next status. `total_pages` of 0 is treated as 1; callers are
/// expected to have clamped `new_page` with [`clamp_page`].
pub fn derive_status(previous: BookStatus, total_pages: u32, new_page: u32) -> Transition {
    let total = total_pages.max(1);

    if new_page >= total {
        return Transition {
            status: BookStatus::Read,
            stamp_completion: previous != BookStatus::Read,
        };
    }

    let status = if previous == BookStatus::ToRead && new_page > 0 {
        BookStatus::Reading
    } else if new_page == 0 && previous == BookStatus::Reading {
        BookStatus::ToRead
    } else {
        previous
    };

    Transition {
        status,
        stamp_completion: false,
    }
}

/// Clamp a requested page into `[0, total_pages]`.
pub fn clamp_page(total_pages: u32, requested: i64) -> u32 {
    requested.clamp(0, total_pages.max(1) as i64) as u32
}

/// The field changes produced by one save of the progress editor.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub current_page: u32,
    pub status: BookStatus,
    /// Present only when this update is the transition into Read.
    pub finished_at: Option<DateTime<Utc>>,
}

impl ProgressUpdate {
    /// Plan the update for `book` when the user sets `requested_page`.
    pub fn plan(book: &Book, requested_page: i64, now: DateTime<Utc>) -> Self {
        let current_page = clamp_page(book.total_pages, requested_page);
        let transition = derive_status(book.status, book.total_pages, current_page);
        Self {
            current_page,
            status: transition.status,
            finished_at: transition.stamp_completion.then_some(now),
        }
    }

    /// Fields to merge into the stored document. `finishedAt` is only
    /// written when stamped, so an existing completion date is never replaced.
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("currentPage".into(), Value::from(self.current_page));
        fields.insert("status".into(), Value::from(self.status.as_str()));
        if let Some(ts) = &self.finished_at {
            fields.insert("finishedAt".into(), Value::from(format_timestamp(ts)));
        }
        fields
    }

    /// Apply to an in-memory copy of the book.
    pub fn apply(&self, book: &mut Book) {
        book.current_page = self.current_page;
        book.status = self.status;
        if self.finished_at.is_some() {
            book.finished_at = self.finished_at;
        }
    }
}
