use crate::db::models::{epoch_ms_now, generate_id, NodeType, Task, TASK_ROOT_ID};
use crate::error::{Result, TodoError};
use crate::sql_constants::{
    SELECT_TASKS_BY_NODE_TYPE, SELECT_TASKS_BY_PARENT, SELECT_TASK_BY_ID, SELECT_TASK_FULL,
    UPSERT_TASK,
};
use sqlx::SqlitePool;
use std::collections::HashSet;

/// Indexed persistent collection of tasks plus the tree mutations that must
/// stay atomic (save+link, recursive delete, children recompute).
///
/// Every write that touches `children` re-derives `node_type` inside the same
/// atomic unit, so the leaf/branch index never drifts from the data.
pub struct TaskStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> TaskStore<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist a task: assigns an id on first save, sets `created_at` once,
    /// refreshes `updated_at`.
    pub async fn save(&self, task: &mut Task) -> Result<()> {
        prepare_for_save(task);
        upsert_task(self.pool, task).await
    }

    /// Partial field update; never touches `created_at`. Delegates to
    /// [`TaskStore::save`] for a task that was never saved.
    pub async fn update(&self, task: &mut Task) -> Result<()> {
        if task.id.is_none() {
            return self.save(task).await;
        }
        task.updated_at = epoch_ms_now().max(task.updated_at);
        upsert_task(self.pool, task).await
    }

    /// Point lookup by id.
    pub async fn get(&self, id: &str) -> Result<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(SELECT_TASK_BY_ID)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(task)
    }

    /// Lookup where absence means the local store lost a record it must have.
    /// Callers treat this error with the destructive-reset recovery policy.
    pub async fn require(&self, id: &str) -> Result<Task> {
        self.get(id)
            .await?
            .ok_or_else(|| TodoError::StorageIntegrity(format!("task record missing: {}", id)))
    }

    /// Batch fetch by id membership. Results come back in the order of `ids`;
    /// unknown ids are skipped.
    pub async fn any_of(&self, ids: &[String]) -> Result<Vec<Task>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> = sqlx::QueryBuilder::new(
            const_format::formatcp!(
                "SELECT {} FROM tasks WHERE id IN (",
                crate::sql_constants::TASK_COLUMNS
            ),
        );
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        builder.push(")");

        let fetched = builder
            .build_query_as::<Task>()
            .fetch_all(self.pool)
            .await?;

        let mut by_id: std::collections::HashMap<String, Task> = fetched
            .into_iter()
            .filter_map(|t| t.id.clone().map(|id| (id, t)))
            .collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// Tasks whose `parent` back-reference equals the given id.
    pub async fn by_parent(&self, parent_id: &str) -> Result<Vec<Task>> {
        let tasks = sqlx::query_as::<_, Task>(SELECT_TASKS_BY_PARENT)
            .bind(parent_id)
            .fetch_all(self.pool)
            .await?;
        Ok(tasks)
    }

    /// All tasks classified `leaf` via the derived index.
    pub async fn leaf_tasks(&self) -> Result<Vec<Task>> {
        let tasks = sqlx::query_as::<_, Task>(SELECT_TASKS_BY_NODE_TYPE)
            .bind(NodeType::Leaf.as_str())
            .fetch_all(self.pool)
            .await?;
        Ok(tasks)
    }

    /// Full collection scan.
    pub async fn all(&self) -> Result<Vec<Task>> {
        let tasks = sqlx::query_as::<_, Task>(SELECT_TASK_FULL)
            .fetch_all(self.pool)
            .await?;
        Ok(tasks)
    }

    /// Resolve the `parent` reference; `None` if absent or not found.
    pub async fn get_parent(&self, task: &Task) -> Result<Option<Task>> {
        match &task.parent {
            Some(parent_id) => self.get(parent_id).await,
            None => Ok(None),
        }
    }

    /// The distinguished root task, created lazily on first access.
    pub async fn ensure_root(&self) -> Result<Task> {
        if let Some(root) = self.get(TASK_ROOT_ID).await? {
            return Ok(root);
        }
        let mut root = Task::new("root", "root task");
        root.id = Some(TASK_ROOT_ID.to_string());
        self.save(&mut root).await?;
        Ok(root)
    }

    /// Recompute `children` from the authoritative `parent` back-references,
    /// healing drift introduced by partial failures. No-op without an id.
    pub async fn repare_children(&self, task: &mut Task) -> Result<()> {
        let Some(id) = task.id.clone() else {
            return Ok(());
        };

        let mut tx = self.pool.begin().await?;

        let child_ids: Vec<String> = sqlx::query_scalar("SELECT id FROM tasks WHERE parent = ?")
            .bind(&id)
            .fetch_all(&mut *tx)
            .await?;

        task.children = child_ids;
        task.updated_at = epoch_ms_now().max(task.updated_at);
        upsert_task(&mut *tx, task).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Link children under a parent: persists the parent and every child,
    /// dedup-appends the child ids, and sets each child's back-reference.
    /// One transaction; partial application is never observable.
    pub async fn save_children(&self, parent: &mut Task, children: &mut [Task]) -> Result<()> {
        prepare_for_save(parent);
        let parent_id = parent.id.clone().ok_or(TodoError::TaskNotSaved)?;

        let mut tx = self.pool.begin().await?;

        for child in children.iter_mut() {
            prepare_for_save(child);
            child.parent = Some(parent_id.clone());
            upsert_task(&mut *tx, child).await?;

            // duplicates are not permitted in `children`
            let child_id = child.id.clone().unwrap_or_default();
            if !parent.children.contains(&child_id) {
                parent.children.push(child_id);
            }
        }

        upsert_task(&mut *tx, parent).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Bare-id variant of [`TaskStore::save_children`]: resolves the ids
    /// against the store first. Unknown ids are a storage-integrity error.
    pub async fn save_children_ids(&self, parent: &mut Task, child_ids: &[String]) -> Result<()> {
        let mut children = Vec::with_capacity(child_ids.len());
        for id in child_ids {
            children.push(self.require(id).await?);
        }
        self.save_children(parent, &mut children).await
    }

    /// Delete the referenced child subtree and strip its id from the parent's
    /// `children`, atomically.
    pub async fn remove_children(&self, parent: &mut Task, child_id: &str) -> Result<()> {
        if parent.id.is_none() {
            return Err(TodoError::TaskNotSaved);
        }

        let mut tx = self.pool.begin().await?;

        let doomed = collect_subtree_ids(&mut tx, child_id).await?;
        delete_ids(&mut tx, &doomed).await?;

        parent.children.retain(|id| id != child_id);
        parent.updated_at = epoch_ms_now().max(parent.updated_at);
        upsert_task(&mut *tx, parent).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Recursively delete this task and its full subtree, children before
    /// self, as one atomic unit.
    pub async fn remove(&self, task: &Task) -> Result<()> {
        let id = task.id.as_deref().ok_or(TodoError::TaskNotSaved)?;

        let mut tx = self.pool.begin().await?;
        let doomed = collect_subtree_ids(&mut tx, id).await?;
        delete_ids(&mut tx, &doomed).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Destructive local reset: clears every task record and the sync marker.
    /// Last-resort recovery after a storage-integrity error, and the local
    /// wipe on logout. Remote is the durable copy once authenticated.
    pub async fn wipe(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM tasks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM client_state WHERE key != 'schema_version'")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Write-time id/timestamp hook shared by every save path.
fn prepare_for_save(task: &mut Task) {
    if task.id.is_none() {
        task.id = Some(generate_id());
    }
    let now = epoch_ms_now();
    if task.created_at == 0 {
        task.created_at = now;
    }
    // monotonically non-decreasing across successive saves
    task.updated_at = now.max(task.updated_at);
}

async fn upsert_task<'e, E>(executor: E, task: &Task) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let children_json = serde_json::to_string(&task.children)?;
    sqlx::query(UPSERT_TASK)
        .bind(task.id.as_deref())
        .bind(&task.name)
        .bind(&task.description)
        .bind(task.is_done)
        .bind(task.parent.as_deref())
        .bind(children_json)
        .bind(task.node_type().as_str())
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(executor)
        .await?;
    Ok(())
}

/// Walk the `children` forward references depth-first and collect every id in
/// the subtree. Runs inside the caller's transaction; a visited set guards
/// against corrupt self-referencing data.
async fn collect_subtree_ids(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    root_id: &str,
) -> Result<Vec<String>> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut stack = vec![root_id.to_string()];
    let mut ordered = Vec::new();

    while let Some(id) = stack.pop() {
        if !seen.insert(id.clone()) {
            continue;
        }
        let children_json: Option<String> =
            sqlx::query_scalar("SELECT children FROM tasks WHERE id = ?")
                .bind(&id)
                .fetch_optional(&mut **tx)
                .await?;
        if let Some(json) = children_json {
            let children: Vec<String> = serde_json::from_str(&json)?;
            stack.extend(children);
        }
        ordered.push(id);
    }

    Ok(ordered)
}

async fn delete_ids(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, ids: &[String]) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> =
        sqlx::QueryBuilder::new("DELETE FROM tasks WHERE id IN (");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(id);
    }
    builder.push(")");
    builder.build().execute(&mut **tx).await?;
    Ok(())
}
