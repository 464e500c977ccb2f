//! Storage abstraction for Shelf.
//!
//! The [`Store`] trait is a small per-user document store: documents live
//! at `users/{user}/{collection}/{id}` and carry a JSON object body. A
//! separate key-value area per user holds client-side settings such as the
//! notification throttle key.
//!
//! Backends are last-write-wins. Implementations must be `Send + Sync` to
//! work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::models::Document;
use crate::query::Query;

/// Address of one document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocPath {
    pub user: String,
    pub collection: String,
    pub id: String,
}

impl DocPath {
    pub fn new(user: impl Into<String>, collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for DocPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "users/{}/{}/{}", self.user, self.collection, self.id)
    }
}

/// Errors a backend reports that callers must tell apart from transient
/// failures. Returned inside `anyhow::Error`; match with `downcast_ref`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("document not found: {0}")]
    NotFound(String),
}

impl StoreError {
    /// The `StoreError` carried by `err`, if any.
    pub fn of(err: &anyhow::Error) -> Option<&StoreError> {
        err.downcast_ref::<StoreError>()
    }

    pub fn is_permission_denied(err: &anyhow::Error) -> bool {
        matches!(Self::of(err), Some(StoreError::PermissionDenied(_)))
    }

    pub fn is_not_found(err: &anyhow::Error) -> bool {
        matches!(Self::of(err), Some(StoreError::NotFound(_)))
    }
}

/// Abstract per-user document store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get`](Store::get) | Read one document |
/// | [`set`](Store::set) | Create or overwrite a document |
/// | [`update`](Store::update) | Merge top-level fields into an existing document |
/// | [`delete`](Store::delete) | Remove a document (missing is not an error) |
/// | [`query`](Store::query) | Read a collection through a [`Query`] |
/// | [`revision`](Store::revision) | Write counter of one collection |
/// | [`get_setting`](Store::get_setting) / [`set_setting`](Store::set_setting) | Per-user key-value settings |
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>>;

    async fn set(&self, path: &DocPath, data: &Map<String, Value>) -> Result<()>;

    /// Fails with [`StoreError::NotFound`] when the document does not exist.
    async fn update(&self, path: &DocPath, fields: &Map<String, Value>) -> Result<()>;

    async fn delete(&self, path: &DocPath) -> Result<()>;

    async fn query(&self, user: &str, query: &Query) -> Result<Vec<Document>>;

    /// Counter that moves on every write to `users/{user}/{collection}`,
    /// including writes made by other processes sharing the backend. Live
    /// queries poll it. Backends only ever written from one process can
    /// keep the default.
    async fn revision(&self, _user: &str, _collection: &str) -> Result<u64> {
        Ok(0)
    }

    async fn get_setting(&self, user: &str, key: &str) -> Result<Option<String>>;

    async fn set_setting(&self, user: &str, key: &str, value: &str) -> Result<()>;
}
