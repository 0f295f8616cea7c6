//! Bidirectional sync between the local task store and a remote object store.
//!
//! The engine keeps a map from store roles to remote file ids plus the
//! modified time recorded at the last exchange. Merging is last-write-wins on
//! `updated_at`: a strictly newer remote snapshot overwrites the local row,
//! ties keep the local row, remote-only tasks are adopted. After merging, the
//! full local task list is pushed back so the remote converges to the merged
//! state.

use crate::db;
use crate::db::models::{epoch_ms_now, Task, TASK_ROOT_ID};
use crate::error::{Result, TodoError};
use crate::remote::{CreateFile, RemoteStore};
use crate::tasks::TaskStore;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Default staleness threshold for [`SyncEngine::have_passed_since_last_sync`].
pub const RELOAD_THRESHOLD_MS: i64 = 300_000;

/// client_state key holding the epoch-millisecond time of the last
/// fully-successful exchange.
pub const LAST_SYNCED_KEY: &str = "last_synced_at";

/// client_state key holding the persisted remote file map, so a fresh
/// process can sync incrementally without re-listing the remote.
pub const FILE_MAP_KEY: &str = "remote_file_map";

/// The four remote objects the engine maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreFile {
    /// Active task list, the only file merged and pushed today.
    Doing,
    Archived,
    Deleted,
    State,
}

impl StoreFile {
    pub const ALL: [StoreFile; 4] = [
        StoreFile::Doing,
        StoreFile::Archived,
        StoreFile::Deleted,
        StoreFile::State,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            StoreFile::Doing => "todo-list-doing",
            StoreFile::Archived => "archived-todo-list",
            StoreFile::Deleted => "deleted-todo-list",
            StoreFile::State => "todo-state",
        }
    }
}

/// Events pushed to subscribers after engine milestones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    /// A full init cycle completed and local state reflects the merge.
    Initiated,
}

/// Remote id and the modified time recorded at the last exchange.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedFile {
    pub remote_id: String,
    pub last_modified_at: DateTime<Utc>,
}

#[derive(Default)]
struct EngineState {
    file_map: HashMap<StoreFile, TrackedFile>,
}

pub struct SyncEngine<R: RemoteStore> {
    pool: SqlitePool,
    remote: R,
    state: tokio::sync::Mutex<EngineState>,
    observers: std::sync::Mutex<Vec<mpsc::UnboundedSender<StoreEvent>>>,
}

impl<R: RemoteStore> SyncEngine<R> {
    pub fn new(pool: SqlitePool, remote: R) -> Self {
        Self {
            pool,
            remote,
            state: tokio::sync::Mutex::new(EngineState::default()),
            observers: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Register an observer; closed receivers are dropped on the next notify.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<StoreEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.lock().unwrap().push(tx);
        rx
    }

    fn notify(&self, event: StoreEvent) {
        self.observers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(event).is_ok());
    }

    pub async fn ready(&self) -> Result<bool> {
        self.remote.ready().await
    }

    pub async fn login(&self) -> Result<bool> {
        self.remote.sign_in().await
    }

    /// Full startup cycle: ensure the remote file map, merge the remote DOING
    /// list into the local store, push the merged state back, record the sync
    /// marker and notify observers. No-op when not signed in.
    pub async fn init(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let result = self.init_locked(&mut state).await;
        drop(state);
        self.recover_storage(result).await
    }

    /// Incremental exchange: fetch DOING metadata only, run a full init cycle
    /// if the remote changed since the last exchange, then push local state.
    pub async fn sync(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let result = self.sync_locked(&mut state).await;
        drop(state);
        self.recover_storage(result).await
    }

    /// Final sync, sign out, wipe all local state.
    pub async fn logout(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.sync_locked(&mut state).await?;
        self.remote.sign_out().await?;
        TaskStore::new(&self.pool).wipe().await?;
        state.file_map.clear();
        info!("signed out, local store cleared");
        Ok(())
    }

    /// Forget the sync marker so the next staleness check reports stale.
    /// Tasks and remote files are untouched.
    pub async fn reset(&self) -> Result<()> {
        db::delete_client_state(&self.pool, LAST_SYNCED_KEY).await
    }

    /// True when at least `threshold_ms` elapsed since the last successful
    /// exchange, or when no exchange ever completed.
    pub async fn have_passed_since_last_sync(&self, threshold_ms: i64) -> Result<bool> {
        match db::get_client_state(&self.pool, LAST_SYNCED_KEY).await? {
            Some(value) => {
                let last: i64 = value.parse().unwrap_or(0);
                Ok(epoch_ms_now() - last >= threshold_ms)
            }
            None => Ok(true),
        }
    }

    async fn init_locked(&self, state: &mut EngineState) -> Result<()> {
        if !self.remote.ready().await? {
            debug!("remote not ready, skipping init");
            return Ok(());
        }
        self.init_file_map(state).await?;
        self.load_initial_content(state).await?;
        self.mark_synced().await?;
        self.notify(StoreEvent::Initiated);
        info!("init complete");
        Ok(())
    }

    async fn sync_locked(&self, state: &mut EngineState) -> Result<()> {
        if !self.remote.ready().await? {
            return Err(TodoError::NotSignedIn);
        }
        self.load_file_map(state).await?;
        let Some(entry) = state.file_map.get(&StoreFile::Doing).cloned() else {
            debug!("no recorded remote file id, running full init");
            return self.init_locked(state).await;
        };

        let meta = self.remote.get_meta(&entry.remote_id).await?;
        if meta.modified_time > entry.last_modified_at {
            debug!(
                remote = %meta.modified_time,
                recorded = %entry.last_modified_at,
                "remote changed, merging before push"
            );
            self.init_locked(state).await?;
        } else {
            debug!("remote unchanged since last exchange");
        }
        self.push_doing(state).await?;
        self.mark_synced().await?;
        Ok(())
    }

    /// Resolve every store role to a remote file id, creating empty-list
    /// placeholders for roles the remote does not have yet.
    async fn init_file_map(&self, state: &mut EngineState) -> Result<()> {
        let files = self.remote.list().await?;
        for role in StoreFile::ALL {
            let found = files.iter().find(|f| f.name == role.file_name());
            let meta = match found {
                Some(meta) => meta.clone(),
                None => {
                    debug!(name = role.file_name(), "creating missing remote file");
                    self.remote
                        .create(CreateFile {
                            id: None,
                            name: role.file_name(),
                            content: "[]",
                            mime_type: None,
                        })
                        .await?
                }
            };
            state.file_map.insert(
                role,
                TrackedFile {
                    remote_id: meta.id,
                    last_modified_at: meta.modified_time,
                },
            );
        }
        self.persist_file_map(state).await?;
        Ok(())
    }

    /// Restore the file map recorded by a previous process. No-op when the
    /// in-memory map is already populated or nothing was persisted.
    async fn load_file_map(&self, state: &mut EngineState) -> Result<()> {
        if !state.file_map.is_empty() {
            return Ok(());
        }
        let Some(raw) = db::get_client_state(&self.pool, FILE_MAP_KEY).await? else {
            return Ok(());
        };
        let by_name: HashMap<String, TrackedFile> = serde_json::from_str(&raw)?;
        for role in StoreFile::ALL {
            if let Some(entry) = by_name.get(role.file_name()) {
                state.file_map.insert(role, entry.clone());
            }
        }
        Ok(())
    }

    async fn persist_file_map(&self, state: &EngineState) -> Result<()> {
        let by_name: HashMap<&str, &TrackedFile> = state
            .file_map
            .iter()
            .map(|(role, entry)| (role.file_name(), entry))
            .collect();
        db::set_client_state(&self.pool, FILE_MAP_KEY, &serde_json::to_string(&by_name)?).await
    }

    /// Merge the remote DOING list into the local store, re-link the adopted
    /// tasks under their parents, then push the merged state back.
    async fn load_initial_content(&self, state: &mut EngineState) -> Result<()> {
        let entry = state
            .file_map
            .get(&StoreFile::Doing)
            .cloned()
            .ok_or_else(|| TodoError::Remote("doing file missing from file map".to_string()))?;

        let content = self.remote.get(&entry.remote_id).await?;
        let snapshots: Vec<Task> = serde_json::from_str(&content)?;
        debug!(count = snapshots.len(), "merging remote tasks");

        let store = TaskStore::new(&self.pool);
        let mut adopted: Vec<Task> = Vec::new();
        for snapshot in snapshots {
            let Some(id) = snapshot.id.clone() else {
                warn!("skipping remote task without id");
                continue;
            };
            match store.get(&id).await? {
                Some(local) => {
                    if snapshot.updated_at > local.updated_at {
                        let mut task = snapshot;
                        store.save(&mut task).await?;
                        adopted.push(task);
                    }
                }
                None => {
                    let mut task = snapshot;
                    store.save(&mut task).await?;
                    adopted.push(task);
                }
            }
        }

        // re-link adopted tasks under their parents; orphans go to root
        let mut by_parent: HashMap<String, Vec<Task>> = HashMap::new();
        for task in adopted {
            if task.is_root() {
                continue;
            }
            let parent_id = task
                .parent
                .clone()
                .unwrap_or_else(|| TASK_ROOT_ID.to_string());
            by_parent.entry(parent_id).or_default().push(task);
        }
        for (parent_id, mut group) in by_parent {
            let parent = if parent_id == TASK_ROOT_ID {
                Some(store.ensure_root().await?)
            } else {
                store.get(&parent_id).await?
            };
            match parent {
                Some(mut parent) => store.save_children(&mut parent, &mut group).await?,
                None => warn!(%parent_id, "adopted tasks reference unknown parent"),
            }
        }

        self.push_doing(state).await?;
        Ok(())
    }

    /// Serialize the full local task list and replace the remote DOING file,
    /// recording the modified time the server reports back.
    async fn push_doing(&self, state: &mut EngineState) -> Result<()> {
        let store = TaskStore::new(&self.pool);
        let tasks = store.all().await?;
        let content = serde_json::to_string(&tasks)?;

        let entry = state.file_map.get_mut(&StoreFile::Doing).ok_or_else(|| {
            TodoError::InvalidInput("no remote file id recorded, run init first".to_string())
        })?;
        let meta = self
            .remote
            .create(CreateFile {
                id: Some(&entry.remote_id),
                name: StoreFile::Doing.file_name(),
                content: &content,
                mime_type: None,
            })
            .await?;
        debug!(count = tasks.len(), modified = %meta.modified_time, "pushed task list");
        entry.last_modified_at = meta.modified_time;
        self.persist_file_map(state).await?;
        Ok(())
    }

    async fn mark_synced(&self) -> Result<()> {
        db::set_client_state(&self.pool, LAST_SYNCED_KEY, &epoch_ms_now().to_string()).await
    }

    /// An integrity failure means the local rows can no longer be trusted;
    /// wipe them so the next init rebuilds from the remote. The original
    /// error still propagates.
    async fn recover_storage(&self, result: Result<()>) -> Result<()> {
        if let Err(TodoError::StorageIntegrity(reason)) = &result {
            error!(%reason, "local storage integrity failure, wiping local state");
            TaskStore::new(&self.pool).wipe().await?;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_helpers::TestContext;

    #[test]
    fn test_store_file_names() {
        assert_eq!(StoreFile::Doing.file_name(), "todo-list-doing");
        assert_eq!(StoreFile::Archived.file_name(), "archived-todo-list");
        assert_eq!(StoreFile::Deleted.file_name(), "deleted-todo-list");
        assert_eq!(StoreFile::State.file_name(), "todo-state");
        assert_eq!(StoreFile::ALL.len(), 4);
    }

    #[tokio::test]
    async fn test_staleness_without_marker() {
        let ctx = TestContext::new().await;
        // no marker recorded yet
        let marker = db::get_client_state(ctx.pool(), LAST_SYNCED_KEY).await.unwrap();
        assert!(marker.is_none());
    }

    #[tokio::test]
    async fn test_staleness_threshold() {
        let ctx = TestContext::new().await;
        let now = epoch_ms_now();

        db::set_client_state(ctx.pool(), LAST_SYNCED_KEY, &now.to_string())
            .await
            .unwrap();
        let fresh = db::get_client_state(ctx.pool(), LAST_SYNCED_KEY)
            .await
            .unwrap()
            .unwrap();
        let last: i64 = fresh.parse().unwrap();
        assert!(epoch_ms_now() - last < RELOAD_THRESHOLD_MS);

        let stale = now - RELOAD_THRESHOLD_MS - 1;
        db::set_client_state(ctx.pool(), LAST_SYNCED_KEY, &stale.to_string())
            .await
            .unwrap();
        let last: i64 = db::get_client_state(ctx.pool(), LAST_SYNCED_KEY)
            .await
            .unwrap()
            .unwrap()
            .parse()
            .unwrap();
        assert!(epoch_ms_now() - last >= RELOAD_THRESHOLD_MS);
    }
}
