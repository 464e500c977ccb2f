use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // One row per document: users/{user_id}/{collection}/{id}
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            user_id TEXT NOT NULL,
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            data_json TEXT NOT NULL DEFAULT '{}',
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (user_id, collection, id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Per-user client settings (notification throttle)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            user_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (user_id, key)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_created_at \
         ON documents(user_id, collection, json_extract(data_json, '$.createdAt'))",
    )
    .execute(&pool)
    .await?;

    // Write counter per collection, bumped by triggers so that every
    // process sharing the file sees every other process's writes.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collection_revisions (
            user_id TEXT NOT NULL,
            collection TEXT NOT NULL,
            revision INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (user_id, collection)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    for (event, row) in [("INSERT", "NEW"), ("UPDATE", "NEW"), ("DELETE", "OLD")] {
        let trigger = format!(
            r#"
            CREATE TRIGGER IF NOT EXISTS documents_revision_{event_lower}
            AFTER {event} ON documents
            BEGIN
                INSERT OR IGNORE INTO collection_revisions (user_id, collection, revision)
                VALUES ({row}.user_id, {row}.collection, 0);
                UPDATE collection_revisions SET revision = revision + 1
                WHERE user_id = {row}.user_id AND collection = {row}.collection;
            END
            "#,
            event_lower = event.to_lowercase(),
        );
        sqlx::query(&trigger).execute(&pool).await?;
    }

    pool.close().await;
    Ok(())
}
