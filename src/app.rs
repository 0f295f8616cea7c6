use crate::db::{create_pool, run_migrations};
use crate::error::Result;
use crate::remote::DriveRemote;
use crate::sync::SyncEngine;
use sqlx::SqlitePool;
use std::path::PathBuf;

const APP_DIR: &str = ".todo-iterator";
const DB_FILE: &str = "tasks.db";

/// Application state: data directory paths plus an open, migrated pool.
#[derive(Debug)]
pub struct AppContext {
    pub root: PathBuf,
    pub db_path: PathBuf,
    pub pool: SqlitePool,
}

impl AppContext {
    /// Resolve the data directory.
    ///
    /// 1. `TODO_ITERATOR_DIR` environment variable
    /// 2. `~/.todo-iterator`
    pub fn data_dir() -> PathBuf {
        if let Ok(env_path) = std::env::var("TODO_ITERATOR_DIR") {
            return PathBuf::from(env_path);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }

    /// Open (creating on first use) the data directory and database.
    pub async fn load_or_init() -> Result<Self> {
        let root = Self::data_dir();
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
            tracing::info!(path = %root.display(), "created data directory");
        }

        let db_path = root.join(DB_FILE);
        let pool = create_pool(&db_path).await?;
        run_migrations(&pool).await?;

        Ok(Self {
            root,
            db_path,
            pool,
        })
    }

    /// Sync engine wired to the Drive remote, token from the environment.
    pub fn sync_engine(&self) -> SyncEngine<DriveRemote> {
        SyncEngine::new(self.pool.clone(), DriveRemote::from_env())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_or_init_creates_directory_and_db() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path().join("data");
        std::env::set_var("TODO_ITERATOR_DIR", &root);

        let ctx = AppContext::load_or_init().await.unwrap();
        assert!(ctx.root.exists());
        assert!(ctx.db_path.ends_with(DB_FILE));

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks")
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);

        std::env::remove_var("TODO_ITERATOR_DIR");
    }
}
