//! # Shelf
//!
//! A local-first personal reading tracker: books and page progress, timed
//! reading sessions, deadline goals, and goal-urgency reminders.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ CLI (shelf)  │   │  HTTP (JSON) │   │ Notification │
//! │              │   │              │   │   manager    │
//! └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!        └──────────┬───────┴──────────────────┘
//!                   ▼
//!        ┌─────────────────────┐      ┌──────────────┐
//!        │ Client / UserScope  │─────▶│  Store       │
//!        │ + change bus (live) │      │ SQLite / mem │
//!        └─────────────────────┘      └──────────────┘
//! ```
//!
//! Every service reads and writes through a [`client::UserScope`]; services
//! coordinate only through the collections they share.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`db`] / [`migrate`] | SQLite connection and schema |
//! | [`sqlite_store`] | SQLite document store |
//! | [`client`] / [`live`] | Shared handle and live queries |
//! | [`optimistic`] | Timeout-raced optimistic saves |
//! | [`books`] / [`library`] | Book commands and the library view |
//! | [`stopwatch`] / [`wakelock`] | Reading stopwatch |
//! | [`stats`] | Reading-time history |
//! | [`goals`] | Goals with derived progress |
//! | [`notify`] | Goal reminders and channels |
//! | [`server`] | HTTP API |
//!
//! Pure domain logic (status derivation, progress aggregation, statistics,
//! reminder text) lives in the `shelf-core` crate.

pub mod books;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod goals;
pub mod library;
pub mod live;
pub mod logging;
pub mod migrate;
pub mod notify;
pub mod optimistic;
pub mod server;
pub mod sqlite_store;
pub mod stats;
pub mod stopwatch;
pub mod wakelock;
