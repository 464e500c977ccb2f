//! SQLite [`Store`] backend.
//!
//! Each document is one row of the `documents` table keyed by
//! `(user_id, collection, id)` with its body in `data_json`. Queries push
//! the filter, ordering and limit down to SQLite through `json_extract`, so
//! a document missing the filtered or ordered field drops out exactly as it
//! does in the in-memory store.
//!
//! Writes rejected by SQLite as read-only surface as
//! [`StoreError::PermissionDenied`].
//!
//! [`Store::revision`] reads the `collection_revisions` counters kept by
//! triggers on `documents`, so writes from any process are visible.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use shelf_core::models::Document;
use shelf_core::query::{Direction, Filter, Query};
use shelf_core::store::{DocPath, Store, StoreError};

const SQLITE_READONLY: i64 = 8;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Map a failed write: read-only databases become `PermissionDenied`.
fn write_error(err: sqlx::Error, what: &str) -> anyhow::Error {
    if let sqlx::Error::Database(db_err) = &err {
        let readonly_code = db_err
            .code()
            .and_then(|c| c.parse::<i64>().ok())
            .map_or(false, |c| c & 0xff == SQLITE_READONLY);
        if readonly_code || db_err.message().contains("readonly") {
            return StoreError::PermissionDenied(format!("{}: {}", what, db_err.message())).into();
        }
    }
    err.into()
}

/// JSON path for a top-level field. Field names are spliced into SQL, so
/// only identifier characters are accepted.
fn json_path(field: &str) -> Result<String> {
    if field.is_empty() || !field.chars().all(|c| c.is_alphanumeric() || c == '_') {
        bail!("invalid field name in query: '{}'", field);
    }
    Ok(format!("$.{}", field))
}

/// A filter value in the form `json_extract` yields it.
enum SqlArg {
    Text(String),
    Int(i64),
    Real(f64),
}

fn sql_arg(value: &Value) -> Option<SqlArg> {
    match value {
        Value::String(s) => Some(SqlArg::Text(s.clone())),
        Value::Bool(b) => Some(SqlArg::Int(*b as i64)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(SqlArg::Int(i)),
            None => n.as_f64().map(SqlArg::Real),
        },
        _ => None,
    }
}

fn row_to_document(id: String, data_json: &str) -> Result<Document> {
    let data: Value = serde_json::from_str(data_json)?;
    Ok(Document { id, data })
}

#[async_trait]
impl Store for SqliteStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT data_json FROM documents WHERE user_id = ? AND collection = ? AND id = ?",
        )
        .bind(&path.user)
        .bind(&path.collection)
        .bind(&path.id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let data_json: String = row.get("data_json");
                Ok(Some(row_to_document(path.id.clone(), &data_json)?))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, path: &DocPath, data: &Map<String, Value>) -> Result<()> {
        let data_json = serde_json::to_string(data)?;
        sqlx::query(
            r#"
            INSERT INTO documents (user_id, collection, id, data_json, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id, collection, id) DO UPDATE SET
                data_json = excluded.data_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&path.user)
        .bind(&path.collection)
        .bind(&path.id)
        .bind(&data_json)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, &path.to_string()))?;
        Ok(())
    }

    async fn update(&self, path: &DocPath, fields: &Map<String, Value>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT data_json FROM documents WHERE user_id = ? AND collection = ? AND id = ?",
        )
        .bind(&path.user)
        .bind(&path.collection)
        .bind(&path.id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Err(StoreError::NotFound(path.to_string()).into());
        };

        let data_json: String = row.get("data_json");
        let mut data = match serde_json::from_str::<Value>(&data_json)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (k, v) in fields {
            data.insert(k.clone(), v.clone());
        }

        sqlx::query(
            "UPDATE documents SET data_json = ?, updated_at = ? \
             WHERE user_id = ? AND collection = ? AND id = ?",
        )
        .bind(serde_json::to_string(&data)?)
        .bind(Utc::now().timestamp_millis())
        .bind(&path.user)
        .bind(&path.collection)
        .bind(&path.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| write_error(e, &path.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| write_error(e, &path.to_string()))?;
        Ok(())
    }

    async fn delete(&self, path: &DocPath) -> Result<()> {
        sqlx::query("DELETE FROM documents WHERE user_id = ? AND collection = ? AND id = ?")
            .bind(&path.user)
            .bind(&path.collection)
            .bind(&path.id)
            .execute(&self.pool)
            .await
            .map_err(|e| write_error(e, &path.to_string()))?;
        Ok(())
    }

    async fn query(&self, user: &str, query: &Query) -> Result<Vec<Document>> {
        // Filters on arrays/objects/null are evaluated in Rust instead.
        let pushed_filter = match &query.filter {
            Some(filter) => match filter {
                Filter::Eq(_, v) | Filter::Gte(_, v) => sql_arg(v).map(|arg| (filter, arg)),
            },
            None => None,
        };
        if query.filter.is_some() && pushed_filter.is_none() {
            let all = self.query(user, &Query::collection(&query.collection)).await?;
            return Ok(query.apply(all));
        }

        let mut sql =
            String::from("SELECT id, data_json FROM documents WHERE user_id = ? AND collection = ?");

        if let Some((filter, _)) = &pushed_filter {
            let op = match filter {
                Filter::Eq(..) => "=",
                Filter::Gte(..) => ">=",
            };
            sql.push_str(&format!(
                " AND json_extract(data_json, '{}') {} ?",
                json_path(filter.field())?,
                op
            ));
        }

        if let Some((field, direction)) = &query.order_by {
            let path = json_path(field)?;
            let dir = match direction {
                Direction::Asc => "ASC",
                Direction::Desc => "DESC",
            };
            sql.push_str(&format!(
                " AND json_extract(data_json, '{path}') IS NOT NULL \
                 ORDER BY json_extract(data_json, '{path}') {dir}, id ASC"
            ));
        } else {
            sql.push_str(" ORDER BY id ASC");
        }

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut q = sqlx::query(&sql).bind(user).bind(&query.collection);
        if let Some((_, arg)) = pushed_filter {
            q = match arg {
                SqlArg::Text(s) => q.bind(s),
                SqlArg::Int(i) => q.bind(i),
                SqlArg::Real(f) => q.bind(f),
            };
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                let data_json: String = row.get("data_json");
                row_to_document(row.get("id"), &data_json)
            })
            .collect()
    }

    async fn revision(&self, user: &str, collection: &str) -> Result<u64> {
        let revision: Option<i64> = sqlx::query_scalar(
            "SELECT revision FROM collection_revisions WHERE user_id = ? AND collection = ?",
        )
        .bind(user)
        .bind(collection)
        .fetch_optional(&self.pool)
        .await?;
        Ok(revision.unwrap_or(0) as u64)
    }

    async fn get_setting(&self, user: &str, key: &str) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM settings WHERE user_id = ? AND key = ?")
                .bind(user)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    async fn set_setting(&self, user: &str, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (user_id, key, value) VALUES (?, ?, ?)
            ON CONFLICT(user_id, key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(user)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, key))?;
        Ok(())
    }
}
