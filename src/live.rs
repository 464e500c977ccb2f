//! Live queries.
//!
//! A [`Subscription`] yields the current result set as soon as it is
//! polled, then a fresh result set after every write to the subscribed
//! user's collection. Writes made through this process's [`Client`] arrive
//! on its change bus. When the client has a watch interval, the store's
//! collection revision is polled as well, which picks up writes from other
//! processes sharing the database. Dropping the subscription unsubscribes.
//!
//! [`Client`]: crate::client::Client

use std::future;
use std::marker::PhantomData;

use anyhow::Result;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use shelf_core::models::Record;
use shelf_core::query::Query;

use crate::client::{Change, UserScope};

pub struct Subscription<T> {
    scope: UserScope,
    query: Query,
    changes: broadcast::Receiver<Change>,
    poll: Option<Interval>,
    seen_revision: Option<u64>,
    dirty: bool,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> Subscription<T> {
    pub(crate) fn new(scope: UserScope, query: Query, changes: broadcast::Receiver<Change>) -> Self {
        let poll = scope.client().watch_interval().map(|period| {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticks
        });
        Self {
            scope,
            query,
            changes,
            poll,
            seen_revision: None,
            dirty: true,
            _record: PhantomData,
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Next snapshot. The first call returns at once; later calls wait for
    /// a write to the collection. The sequence never ends on its own, since
    /// the subscription keeps its client (and so the change bus) alive.
    ///
    /// Cancel-safe: if the future is dropped after a change was noticed,
    /// the next call re-queries without waiting.
    pub async fn next(&mut self) -> Result<Vec<T>> {
        if !self.dirty {
            self.wait_for_change().await?;
            self.dirty = true;
        }
        if self.poll.is_some() {
            // Read before the snapshot so a write racing it is seen again.
            match self.scope.revision(&self.query.collection).await {
                Ok(revision) => self.seen_revision = Some(revision),
                Err(e) => tracing::warn!(collection = %self.query.collection, error = %e, "revision check failed"),
            }
        }
        let snapshot = self.scope.fetch(&self.query).await;
        self.dirty = false;
        snapshot
    }

    async fn wait_for_change(&mut self) -> Result<()> {
        loop {
            tokio::select! {
                received = self.changes.recv() => match received {
                    Ok(change) => {
                        if change.user == self.scope.user_id() && change.collection == self.query.collection {
                            return Ok(());
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, collection = %self.query.collection, "subscription lagged; re-querying");
                        return Ok(());
                    }
                    Err(RecvError::Closed) => anyhow::bail!("change bus closed"),
                },
                _ = tick(&mut self.poll) => {
                    match self.scope.revision(&self.query.collection).await {
                        Ok(revision) if Some(revision) != self.seen_revision => return Ok(()),
                        Ok(_) => {}
                        Err(e) => tracing::warn!(collection = %self.query.collection, error = %e, "revision check failed"),
                    }
                }
            }
        }
    }
}

async fn tick(poll: &mut Option<Interval>) {
    match poll {
        Some(ticks) => {
            ticks.tick().await;
        }
        None => future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{query, Client};
    use crate::config::Config;
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use shelf_core::models::{Document, Goal, GoalUnit, ReadingSession};
    use shelf_core::store::memory::InMemoryStore;
    use shelf_core::store::{DocPath, Store};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn goal(name: &str) -> Goal {
        Goal {
            id: String::new(),
            name: name.to_string(),
            unit: GoalUnit::Chapters,
            current: 0.0,
            total: 10.0,
            deadline: None,
            created_at: None,
        }
    }

    /// In-memory store whose queries take a while to answer.
    struct SlowQueries(InMemoryStore);

    #[async_trait]
    impl Store for SlowQueries {
        async fn get(&self, path: &DocPath) -> Result<Option<Document>> {
            self.0.get(path).await
        }
        async fn set(&self, path: &DocPath, data: &Map<String, Value>) -> Result<()> {
            self.0.set(path, data).await
        }
        async fn update(&self, path: &DocPath, fields: &Map<String, Value>) -> Result<()> {
            self.0.update(path, fields).await
        }
        async fn delete(&self, path: &DocPath) -> Result<()> {
            self.0.delete(path).await
        }
        async fn query(&self, user: &str, query: &Query) -> Result<Vec<Document>> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.0.query(user, query).await
        }
        async fn get_setting(&self, user: &str, key: &str) -> Result<Option<String>> {
            self.0.get_setting(user, key).await
        }
        async fn set_setting(&self, user: &str, key: &str, value: &str) -> Result<()> {
            self.0.set_setting(user, key, value).await
        }
    }

    #[tokio::test]
    async fn initial_snapshot_then_updates() {
        let client = Client::new(Arc::new(InMemoryStore::new()));
        let me = client.user("u1");
        me.create(goal("first")).await.unwrap();

        let mut sub = me.subscribe::<Goal>(query::<Goal>());
        assert_eq!(sub.next().await.unwrap().len(), 1);

        me.create(goal("second")).await.unwrap();
        let snap = sub.next().await.unwrap();
        assert_eq!(snap.len(), 2);
    }

    #[tokio::test]
    async fn ignores_other_users_and_collections() {
        let client = Client::new(Arc::new(InMemoryStore::new()));
        let me = client.user("u1");
        let mut sub = me.subscribe::<Goal>(query::<Goal>());
        sub.next().await.unwrap();

        client.user("u2").create(goal("theirs")).await.unwrap();
        me.create(ReadingSession {
            id: String::new(),
            book_id: "b".into(),
            book_title: "t".into(),
            duration_seconds: 60,
            created_at: None,
            device: Default::default(),
        })
        .await
        .unwrap();

        let pending = tokio::time::timeout(Duration::from_millis(50), sub.next()).await;
        assert!(pending.is_err(), "no snapshot expected for unrelated writes");
    }

    #[tokio::test(start_paused = true)]
    async fn change_survives_a_dropped_next() {
        let client = Client::new(Arc::new(SlowQueries(InMemoryStore::new())));
        let me = client.user("u1");
        let mut sub = me.subscribe::<Goal>(query::<Goal>());
        assert!(sub.next().await.unwrap().is_empty());

        me.create(goal("first")).await.unwrap();
        // Gives up while the re-query is still running.
        let dropped = tokio::time::timeout(Duration::from_millis(10), sub.next()).await;
        assert!(dropped.is_err());

        // No further write: the noticed change is still delivered.
        let snap = tokio::time::timeout(Duration::from_secs(1), sub.next())
            .await
            .expect("pending change was lost")
            .unwrap();
        assert_eq!(snap.len(), 1);
    }

    #[tokio::test]
    async fn sees_writes_from_another_client_on_the_same_database() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::with_db_path(tmp.path().join("data/shelf.sqlite"));
        config.db.watch_interval_ms = 50;

        let watcher = Client::open(&config).await.unwrap();
        let writer = Client::open(&config).await.unwrap();

        let mut sub = watcher.user("u1").subscribe::<Goal>(query::<Goal>());
        assert!(sub.next().await.unwrap().is_empty());

        writer.user("u1").create(goal("from elsewhere")).await.unwrap();
        let snap = tokio::time::timeout(Duration::from_secs(3), sub.next())
            .await
            .expect("write from the other client was not seen")
            .unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].name, "from elsewhere");

        // Other users' writes do not wake the subscription.
        writer.user("u2").create(goal("theirs")).await.unwrap();
        let pending = tokio::time::timeout(Duration::from_millis(300), sub.next()).await;
        assert!(pending.is_err());
    }
}
