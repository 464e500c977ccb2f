//! Shared database handle.
//!
//! [`Client`] wraps a [`Store`] backend together with a change bus. It is
//! built once by the application root and cloned into every service; there
//! is no global instance. [`UserScope`] binds it to the authenticated user
//! so services only ever see their own namespace.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use shelf_core::models::Record;
use shelf_core::query::Query;
use shelf_core::store::{DocPath, Store};

use crate::config::Config;
use crate::live::Subscription;
use crate::sqlite_store::SqliteStore;
use crate::{db, migrate};

const CHANGE_BUS_CAPACITY: usize = 256;

/// A write happened to `users/{user}/{collection}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub user: String,
    pub collection: String,
}

#[derive(Clone)]
pub struct Client {
    store: Arc<dyn Store>,
    changes: broadcast::Sender<Change>,
    watch_interval: Option<Duration>,
}

impl Client {
    /// A client whose writers all live in this process. Live queries react
    /// to the change bus only.
    pub fn new(store: Arc<dyn Store>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUS_CAPACITY);
        Self {
            store,
            changes,
            watch_interval: None,
        }
    }

    /// Also poll [`Store::revision`] every `interval`, so live queries see
    /// writes made by other processes sharing the store.
    pub fn with_watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = Some(interval);
        self
    }

    /// Open the configured SQLite database, creating tables as needed.
    pub async fn open(config: &Config) -> Result<Self> {
        migrate::run_migrations(config).await?;
        let pool = db::connect(config).await?;
        Ok(Self::new(Arc::new(SqliteStore::new(pool))).with_watch_interval(config.db.watch_interval()))
    }

    pub fn watch_interval(&self) -> Option<Duration> {
        self.watch_interval
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn user(&self, user_id: impl Into<String>) -> UserScope {
        UserScope {
            client: self.clone(),
            user: user_id.into(),
        }
    }

    pub fn changes(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }

    fn publish(&self, user: &str, collection: &str) {
        // No receivers is fine.
        let _ = self.changes.send(Change {
            user: user.to_string(),
            collection: collection.to_string(),
        });
    }
}

/// Base query over a record's collection.
pub fn query<T: Record>() -> Query {
    Query::collection(T::COLLECTION)
}

/// Fresh document id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A [`Client`] bound to one user namespace.
#[derive(Clone)]
pub struct UserScope {
    client: Client,
    user: String,
}

impl UserScope {
    pub fn user_id(&self) -> &str {
        &self.user
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn path<T: Record>(&self, id: &str) -> DocPath {
        DocPath::new(&self.user, T::COLLECTION, id)
    }

    /// Run `query` and decode the results. Documents that fail to decode
    /// are logged and skipped.
    pub async fn fetch<T: Record>(&self, query: &Query) -> Result<Vec<T>> {
        let docs = self.client.store.query(&self.user, query).await?;
        Ok(docs
            .into_iter()
            .filter_map(|doc| {
                let id = doc.id.clone();
                match T::from_document(doc) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        tracing::warn!(collection = T::COLLECTION, id = %id, error = %e, "skipping malformed document");
                        None
                    }
                }
            })
            .collect())
    }

    pub async fn get<T: Record>(&self, id: &str) -> Result<Option<T>> {
        match self.client.store.get(&self.path::<T>(id)).await? {
            Some(doc) => Ok(Some(T::from_document(doc)?)),
            None => Ok(None),
        }
    }

    /// Write `record`, assigning an id when it has none. Returns the id.
    pub async fn create<T: Record>(&self, mut record: T) -> Result<String> {
        if record.id().is_empty() {
            record.set_id(new_id());
        }
        let id = record.id().to_string();
        self.client
            .store
            .set(&self.path::<T>(&id), &record.to_fields()?)
            .await?;
        self.client.publish(&self.user, T::COLLECTION);
        Ok(id)
    }

    /// Merge `fields` into an existing record.
    pub async fn update<T: Record>(&self, id: &str, fields: Map<String, Value>) -> Result<()> {
        self.client.store.update(&self.path::<T>(id), &fields).await?;
        self.client.publish(&self.user, T::COLLECTION);
        Ok(())
    }

    pub async fn delete<T: Record>(&self, id: &str) -> Result<()> {
        self.client.store.delete(&self.path::<T>(id)).await?;
        self.client.publish(&self.user, T::COLLECTION);
        Ok(())
    }

    /// Live view over `query`. See [`Subscription`].
    pub fn subscribe<T: Record>(&self, query: Query) -> Subscription<T> {
        Subscription::new(self.clone(), query, self.client.changes())
    }

    /// Write counter of `collection` in this namespace.
    pub async fn revision(&self, collection: &str) -> Result<u64> {
        self.client.store.revision(&self.user, collection).await
    }

    pub async fn setting(&self, key: &str) -> Result<Option<String>> {
        self.client.store.get_setting(&self.user, key).await
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.client.store.set_setting(&self.user, key, value).await
    }
}
