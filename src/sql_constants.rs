//! SQL query constants and fragments
//!
//! Centralizes the task column list and the handful of queries reused across
//! the store and the sync engine. Dynamic WHERE clauses stay inline.

/// Standard column list for task queries.
///
/// Columns: id, name, description, is_done, parent, children, node_type,
///          created_at, updated_at
pub const TASK_COLUMNS: &str =
    "id, name, description, is_done, parent, children, node_type, created_at, updated_at";

/// Base SELECT query for tasks. Add WHERE clauses as needed.
pub const SELECT_TASK_FULL: &str = const_format::formatcp!("SELECT {} FROM tasks", TASK_COLUMNS);

/// Point lookup by id.
pub const SELECT_TASK_BY_ID: &str =
    const_format::formatcp!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS);

/// Equality lookup on the parent back-reference.
pub const SELECT_TASKS_BY_PARENT: &str =
    const_format::formatcp!("SELECT {} FROM tasks WHERE parent = ?", TASK_COLUMNS);

/// Equality lookup on the derived classification.
pub const SELECT_TASKS_BY_NODE_TYPE: &str =
    const_format::formatcp!("SELECT {} FROM tasks WHERE node_type = ?", TASK_COLUMNS);

/// Upsert keyed by id. `created_at` is written only on first insert; every
/// conflict update carries a fresh `updated_at` and recomputed `node_type`.
pub const UPSERT_TASK: &str = "INSERT INTO tasks \
     (id, name, description, is_done, parent, children, node_type, created_at, updated_at) \
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
     ON CONFLICT(id) DO UPDATE SET \
       name = excluded.name, \
       description = excluded.description, \
       is_done = excluded.is_done, \
       parent = excluded.parent, \
       children = excluded.children, \
       node_type = excluded.node_type, \
       updated_at = excluded.updated_at";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_columns_format() {
        assert!(TASK_COLUMNS.contains("id"));
        assert!(TASK_COLUMNS.contains("children"));
        assert!(TASK_COLUMNS.contains("node_type"));
        assert!(TASK_COLUMNS.contains("updated_at"));
    }

    #[test]
    fn test_select_task_by_id() {
        assert_eq!(
            SELECT_TASK_BY_ID,
            "SELECT id, name, description, is_done, parent, children, node_type, created_at, updated_at FROM tasks WHERE id = ?"
        );
    }

    #[test]
    fn test_upsert_preserves_created_at() {
        // The conflict clause must never touch created_at.
        let update_clause = UPSERT_TASK.split("DO UPDATE SET").nth(1).unwrap();
        assert!(!update_clause.contains("created_at"));
        assert!(update_clause.contains("updated_at = excluded.updated_at"));
    }
}
