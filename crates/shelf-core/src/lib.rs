//! # Shelf Core
//!
//! Runtime-agnostic logic for Shelf: the stored records, book status
//! derivation, goal progress aggregation, reading-time statistics, reminder
//! composition, and the document store abstraction.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. Everything here is
//! a pure function of its inputs (the clock is always passed in), apart from
//! the in-memory store.

pub mod models;
pub mod progress;
pub mod query;
pub mod reading_stats;
pub mod reminder;
pub mod status;
pub mod store;
