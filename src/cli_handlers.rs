//! Command handlers shared by the CLI entry point.

use crate::db;
use crate::db::models::{Task, TASK_ROOT_ID};
use crate::error::{Result, TodoError};
use crate::remote::RemoteStore;
use crate::sync::{SyncEngine, LAST_SYNCED_KEY, RELOAD_THRESHOLD_MS};
use crate::tasks::TaskStore;
use chrono::DateTime;
use serde_json::json;
use std::collections::HashMap;

/// Unknown ids typed by the user are input errors, not storage corruption.
async fn require_existing(store: &TaskStore<'_>, id: &str) -> Result<Task> {
    store
        .get(id)
        .await?
        .ok_or_else(|| TodoError::InvalidInput(format!("no task with id {}", id)))
}

fn check_mark(task: &Task) -> &'static str {
    if task.is_done {
        "[x]"
    } else {
        "[ ]"
    }
}

fn print_task_line(task: &Task, depth: usize) {
    let id = task.id.as_deref().unwrap_or("?");
    let suffix = match task.node_type() {
        crate::db::models::NodeType::Branch => format!(" ({} subtasks)", task.children.len()),
        crate::db::models::NodeType::Leaf => String::new(),
    };
    println!(
        "{}{} {}  [{}]{}",
        "  ".repeat(depth),
        check_mark(task),
        task.name,
        id,
        suffix
    );
}

fn print_tasks(tasks: &[Task], format: &str) -> Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(tasks)?);
    } else {
        for task in tasks {
            print_task_line(task, 0);
        }
        if tasks.is_empty() {
            println!("(no tasks)");
        }
    }
    Ok(())
}

pub async fn handle_add(
    store: &TaskStore<'_>,
    name: &str,
    description: &str,
    parent_id: Option<String>,
    format: &str,
) -> Result<()> {
    let mut parent = match parent_id {
        Some(id) => require_existing(store, &id).await?,
        None => store.ensure_root().await?,
    };

    let mut children = [Task::new(name.to_string(), description.to_string())];
    store.save_children(&mut parent, &mut children).await?;
    let task = &children[0];

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(task)?);
    } else {
        println!(
            "Added {} under {}",
            task.id.as_deref().unwrap_or("?"),
            parent.name
        );
    }
    Ok(())
}

pub async fn handle_list(
    store: &TaskStore<'_>,
    parent_id: Option<String>,
    format: &str,
) -> Result<()> {
    let parent = match parent_id {
        Some(id) => require_existing(store, &id).await?,
        None => store.ensure_root().await?,
    };
    // children ids carry the display order
    let tasks = store.any_of(&parent.children).await?;
    print_tasks(&tasks, format)
}

pub async fn handle_tree(store: &TaskStore<'_>, format: &str) -> Result<()> {
    let root = store.ensure_root().await?;
    let all = store.all().await?;
    let by_id: HashMap<&str, &Task> = all
        .iter()
        .filter_map(|t| t.id.as_deref().map(|id| (id, t)))
        .collect();

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&tree_value(&root, &by_id))?);
        return Ok(());
    }

    // depth-first, children in stored order
    let mut stack: Vec<(&Task, usize)> = vec![(by_id.get(TASK_ROOT_ID).copied().unwrap_or(&root), 0)];
    while let Some((task, depth)) = stack.pop() {
        print_task_line(task, depth);
        for child_id in task.children.iter().rev() {
            if let Some(child) = by_id.get(child_id.as_str()) {
                stack.push((child, depth + 1));
            }
        }
    }
    Ok(())
}

fn tree_value(task: &Task, by_id: &HashMap<&str, &Task>) -> serde_json::Value {
    let children: Vec<serde_json::Value> = task
        .children
        .iter()
        .filter_map(|id| by_id.get(id.as_str()))
        .map(|child| tree_value(child, by_id))
        .collect();
    json!({
        "id": task.id,
        "name": task.name,
        "isDone": task.is_done,
        "nodeType": task.node_type().as_str(),
        "children": children,
    })
}

pub async fn handle_queue(store: &TaskStore<'_>, format: &str) -> Result<()> {
    let mut leaves = store.leaf_tasks().await?;
    leaves.retain(|t| !t.is_done && !t.is_root());
    print_tasks(&leaves, format)
}

pub async fn handle_done(store: &TaskStore<'_>, id: &str) -> Result<()> {
    let mut task = require_existing(store, id).await?;
    task.is_done = !task.is_done;
    store.update(&mut task).await?;
    println!("{} {}", check_mark(&task), task.name);
    Ok(())
}

pub async fn handle_remove(store: &TaskStore<'_>, id: &str) -> Result<()> {
    let task = require_existing(store, id).await?;
    if task.is_root() {
        return Err(TodoError::InvalidInput(
            "the root task cannot be removed".to_string(),
        ));
    }
    let removed_name = task.name.clone();
    match store.get_parent(&task).await? {
        Some(mut parent) => store.remove_children(&mut parent, id).await?,
        None => store.remove(&task).await?,
    }
    println!("Removed {}", removed_name);
    Ok(())
}

pub async fn handle_sync<R: RemoteStore>(engine: &SyncEngine<R>, full: bool) -> Result<()> {
    if !engine.login().await? {
        return Err(TodoError::NotSignedIn);
    }
    if full {
        engine.init().await?;
    } else {
        engine.sync().await?;
    }
    println!("Sync complete");
    Ok(())
}

pub async fn handle_login<R: RemoteStore>(engine: &SyncEngine<R>) -> Result<()> {
    if engine.login().await? {
        println!("Signed in");
    } else {
        println!("Not signed in (set GOOGLE_ACCESS_TOKEN)");
    }
    Ok(())
}

pub async fn handle_logout<R: RemoteStore>(engine: &SyncEngine<R>) -> Result<()> {
    if !engine.login().await? {
        return Err(TodoError::NotSignedIn);
    }
    engine.logout().await?;
    println!("Signed out, local data cleared");
    Ok(())
}

pub async fn handle_reset<R: RemoteStore>(engine: &SyncEngine<R>) -> Result<()> {
    engine.reset().await?;
    println!("Sync marker cleared");
    Ok(())
}

pub async fn handle_status<R: RemoteStore>(engine: &SyncEngine<R>, format: &str) -> Result<()> {
    let pool = engine.pool();
    let store = TaskStore::new(pool);
    let all = store.all().await?;
    let total = all.len().saturating_sub(1); // root excluded
    let done = all.iter().filter(|t| !t.is_root() && t.is_done).count();
    let leaves = all
        .iter()
        .filter(|t| !t.is_root() && t.children.is_empty())
        .count();

    let last_synced = db::get_client_state(pool, LAST_SYNCED_KEY).await?;
    let last_synced_ms: Option<i64> = last_synced.and_then(|v| v.parse().ok());
    let stale = engine
        .have_passed_since_last_sync(RELOAD_THRESHOLD_MS)
        .await?;

    if format == "json" {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "tasks": total,
                "done": done,
                "leaves": leaves,
                "lastSyncedAt": last_synced_ms,
                "stale": stale,
            }))?
        );
        return Ok(());
    }

    println!("Tasks:   {} ({} done, {} actionable)", total, done, leaves);
    match last_synced_ms.and_then(DateTime::from_timestamp_millis) {
        Some(ts) => println!("Synced:  {}{}", ts.to_rfc3339(), if stale { " (stale)" } else { "" }),
        None => println!("Synced:  never"),
    }
    Ok(())
}
