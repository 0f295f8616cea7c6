pub mod models;

use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;

use models::{epoch_ms_now, TASK_ROOT_ID};

pub const SCHEMA_VERSION: &str = "1";

pub async fn create_pool(db_path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA journal_mode=WAL;").execute(pool).await?;

    // Single task collection. `children` is a JSON array of ids; `node_type`
    // is derived from it by a write-time hook in the store and must stay in
    // step inside the same atomic unit as the triggering write.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            is_done INTEGER NOT NULL DEFAULT 0,
            parent TEXT,
            children TEXT NOT NULL DEFAULT '[]',
            node_type TEXT NOT NULL DEFAULT 'leaf',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            CHECK (node_type IN ('leaf', 'branch'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(parent)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_node_type ON tasks(node_type)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_updated_at ON tasks(updated_at)")
        .execute(pool)
        .await?;

    // Key-value client state: schema version and the last-synced marker.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS client_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Seed the root task on a fresh database.
    let now = epoch_ms_now();
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO tasks
            (id, name, description, is_done, parent, children, node_type, created_at, updated_at)
        VALUES (?, 'root', 'root task', 0, NULL, '[]', 'leaf', ?, ?)
        "#,
    )
    .bind(TASK_ROOT_ID)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO client_state (key, value)
        VALUES ('schema_version', ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(SCHEMA_VERSION)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_client_state(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value = sqlx::query_scalar("SELECT value FROM client_state WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

pub async fn set_client_state(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO client_state (key, value)
        VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_client_state(pool: &SqlitePool, key: &str) -> Result<()> {
    sqlx::query("DELETE FROM client_state WHERE key = ?")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_pool_success() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let pool = create_pool(&db_path).await.unwrap();

        let result: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(result, 1);
    }

    #[tokio::test]
    async fn test_run_migrations_creates_tables() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = create_pool(&db_path).await.unwrap();

        run_migrations(&pool).await.unwrap();

        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();

        assert!(tables.contains(&"tasks".to_string()));
        assert!(tables.contains(&"client_state".to_string()));
    }

    #[tokio::test]
    async fn test_run_migrations_seeds_root_task() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = create_pool(&db_path).await.unwrap();

        run_migrations(&pool).await.unwrap();

        let (name, parent): (String, Option<String>) =
            sqlx::query_as("SELECT name, parent FROM tasks WHERE id = ?")
                .bind(TASK_ROOT_ID)
                .fetch_one(&pool)
                .await
                .unwrap();

        assert_eq!(name, "root");
        assert!(parent.is_none());
    }

    #[tokio::test]
    async fn test_run_migrations_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = create_pool(&db_path).await.unwrap();

        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        // Exactly one root row survives repeated migration runs.
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE id = ?")
            .bind(TASK_ROOT_ID)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_schema_version_tracking() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = create_pool(&db_path).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let version: String =
            sqlx::query_scalar("SELECT value FROM client_state WHERE key = 'schema_version'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_client_state_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = create_pool(&db_path).await.unwrap();
        run_migrations(&pool).await.unwrap();

        assert!(get_client_state(&pool, "last_synced_at").await.unwrap().is_none());
        set_client_state(&pool, "last_synced_at", "42").await.unwrap();
        assert_eq!(
            get_client_state(&pool, "last_synced_at").await.unwrap().as_deref(),
            Some("42")
        );
        set_client_state(&pool, "last_synced_at", "43").await.unwrap();
        assert_eq!(
            get_client_state(&pool, "last_synced_at").await.unwrap().as_deref(),
            Some("43")
        );
        delete_client_state(&pool, "last_synced_at").await.unwrap();
        assert!(get_client_state(&pool, "last_synced_at").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_node_type_constraint() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = create_pool(&db_path).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let result = sqlx::query(
            "INSERT INTO tasks (id, name, node_type, created_at, updated_at) VALUES ('x', 'n', 'trunk', 0, 0)",
        )
        .execute(&pool)
        .await;

        assert!(result.is_err());
    }
}
