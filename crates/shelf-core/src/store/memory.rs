//! In-memory [`Store`] implementation for tests and ephemeral sessions.
//!
//! Uses `BTreeMap`s behind `std::sync::RwLock`, so unordered queries return
//! documents by id. Can be switched to read-only to exercise the
//! permission-denied path.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::models::Document;
use crate::query::Query;

use super::{DocPath, Store, StoreError};

type CollectionKey = (String, String);

/// In-memory store.
pub struct InMemoryStore {
    collections: RwLock<BTreeMap<CollectionKey, BTreeMap<String, Map<String, Value>>>>,
    settings: RwLock<BTreeMap<(String, String), String>>,
    read_only: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(BTreeMap::new()),
            settings: RwLock::new(BTreeMap::new()),
            read_only: AtomicBool::new(false),
        }
    }

    /// Reject every write with [`StoreError::PermissionDenied`].
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    fn check_writable(&self, what: &str) -> Result<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StoreError::PermissionDenied(format!("store is read-only ({})", what)).into());
        }
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn key(path: &DocPath) -> CollectionKey {
    (path.user.clone(), path.collection.clone())
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>> {
        let collections = self.collections.read().unwrap();
        Ok(collections
            .get(&key(path))
            .and_then(|docs| docs.get(&path.id))
            .map(|fields| Document {
                id: path.id.clone(),
                data: Value::Object(fields.clone()),
            }))
    }

    async fn set(&self, path: &DocPath, data: &Map<String, Value>) -> Result<()> {
        self.check_writable(&path.to_string())?;
        let mut collections = self.collections.write().unwrap();
        collections
            .entry(key(path))
            .or_default()
            .insert(path.id.clone(), data.clone());
        Ok(())
    }

    async fn update(&self, path: &DocPath, fields: &Map<String, Value>) -> Result<()> {
        self.check_writable(&path.to_string())?;
        let mut collections = self.collections.write().unwrap();
        let doc = collections
            .get_mut(&key(path))
            .and_then(|docs| docs.get_mut(&path.id))
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        for (k, v) in fields {
            doc.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    async fn delete(&self, path: &DocPath) -> Result<()> {
        self.check_writable(&path.to_string())?;
        let mut collections = self.collections.write().unwrap();
        if let Some(docs) = collections.get_mut(&key(path)) {
            docs.remove(&path.id);
        }
        Ok(())
    }

    async fn query(&self, user: &str, query: &Query) -> Result<Vec<Document>> {
        let docs: Vec<Document> = {
            let collections = self.collections.read().unwrap();
            collections
                .get(&(user.to_string(), query.collection.clone()))
                .map(|docs| {
                    docs.iter()
                        .map(|(id, fields)| Document {
                            id: id.clone(),
                            data: Value::Object(fields.clone()),
                        })
                        .collect()
                })
                .unwrap_or_default()
        };
        Ok(query.apply(docs))
    }

    async fn get_setting(&self, user: &str, key: &str) -> Result<Option<String>> {
        let settings = self.settings.read().unwrap();
        Ok(settings.get(&(user.to_string(), key.to_string())).cloned())
    }

    async fn set_setting(&self, user: &str, key: &str, value: &str) -> Result<()> {
        self.check_writable(key)?;
        let mut settings = self.settings.write().unwrap();
        settings.insert((user.to_string(), key.to_string()), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Direction;
    use serde_json::json;

    fn fields(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn set_get_update_delete() {
        let store = InMemoryStore::new();
        let path = DocPath::new("u1", "userBooks", "b1");

        store.set(&path, &fields(json!({ "title": "Dune", "currentPage": 0 }))).await.unwrap();
        store.update(&path, &fields(json!({ "currentPage": 12 }))).await.unwrap();

        let doc = store.get(&path).await.unwrap().unwrap();
        assert_eq!(doc.data["title"], json!("Dune"));
        assert_eq!(doc.data["currentPage"], json!(12));

        store.delete(&path).await.unwrap();
        assert!(store.get(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_missing_document_is_not_found() {
        let store = InMemoryStore::new();
        let err = store
            .update(&DocPath::new("u1", "goals", "nope"), &Map::new())
            .await
            .unwrap_err();
        assert!(StoreError::is_not_found(&err));
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let store = InMemoryStore::new();
        store.set(&DocPath::new("u1", "goals", "g"), &fields(json!({ "name": "a" }))).await.unwrap();
        store.set(&DocPath::new("u2", "goals", "g"), &fields(json!({ "name": "b" }))).await.unwrap();

        let q = Query::collection("goals");
        let u1 = store.query("u1", &q).await.unwrap();
        assert_eq!(u1.len(), 1);
        assert_eq!(u1[0].data["name"], json!("a"));
        assert!(store.query("u3", &q).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn query_orders_and_limits() {
        let store = InMemoryStore::new();
        for (id, ts) in [("s1", "2026-10-01"), ("s2", "2026-10-03"), ("s3", "2026-10-02")] {
            store
                .set(&DocPath::new("u", "readingSessions", id), &fields(json!({ "createdAt": ts })))
                .await
                .unwrap();
        }
        let q = Query::collection("readingSessions")
            .order_by("createdAt", Direction::Desc)
            .limit(2);
        let ids: Vec<String> = store.query("u", &q).await.unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["s2", "s3"]);
    }

    #[tokio::test]
    async fn read_only_rejects_writes() {
        let store = InMemoryStore::new();
        store.set_read_only(true);
        let err = store
            .set(&DocPath::new("u", "goals", "g"), &Map::new())
            .await
            .unwrap_err();
        assert!(StoreError::is_permission_denied(&err));
        assert!(store.get(&DocPath::new("u", "goals", "g")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn settings_round_trip_per_user() {
        let store = InMemoryStore::new();
        store.set_setting("u1", "k", "v").await.unwrap();
        assert_eq!(store.get_setting("u1", "k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.get_setting("u2", "k").await.unwrap(), None);
    }
}
