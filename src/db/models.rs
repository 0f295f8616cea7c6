use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

/// Fixed id of the single parentless root task.
pub const TASK_ROOT_ID: &str = "root-task-id";

/// Derived leaf/branch classification, computed solely from `children`.
///
/// Stored redundantly in the `node_type` column so "all leaf tasks" is an
/// equality query instead of a full scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Leaf,
    Branch,
}

impl NodeType {
    pub fn of(children: &[String]) -> Self {
        if children.is_empty() {
            NodeType::Leaf
        } else {
            NodeType::Branch
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Leaf => "leaf",
            NodeType::Branch => "branch",
        }
    }
}

/// A node in the todo tree.
///
/// The same shape is used as the remote snapshot wire format: a JSON array of
/// these objects is the content of the `todo-list-doing` remote object.
/// Timestamps are epoch milliseconds; a snapshot missing them merges as 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl Task {
    /// A fresh, unpersisted task. The id is assigned on first save.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: description.into(),
            is_done: false,
            parent: None,
            children: Vec::new(),
            created_at: 0,
            updated_at: 0,
        }
    }

    pub fn node_type(&self) -> NodeType {
        NodeType::of(&self.children)
    }

    pub fn is_root(&self) -> bool {
        self.id.as_deref() == Some(TASK_ROOT_ID)
    }
}

/// Client-side id generation; remote snapshots carry these ids verbatim.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current wall clock as epoch milliseconds, the `updatedAt` merge key unit.
pub fn epoch_ms_now() -> i64 {
    Utc::now().timestamp_millis()
}

// The store boundary always yields a canonical Task; the `children` column is
// a JSON array of ids and decodes here rather than at every call site.
impl<'r> sqlx::FromRow<'r, SqliteRow> for Task {
    fn from_row(row: &'r SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        let children_json: String = row.try_get("children")?;
        let children: Vec<String> =
            serde_json::from_str(&children_json).map_err(|e| sqlx::Error::ColumnDecode {
                index: "children".to_string(),
                source: Box::new(e),
            })?;

        Ok(Task {
            id: Some(row.try_get("id")?),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            is_done: row.try_get("is_done")?,
            parent: row.try_get("parent")?,
            children,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
