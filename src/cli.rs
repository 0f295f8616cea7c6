use clap::{Parser, Subcommand};

const LONG_ABOUT: &str = r#"
todo-iterator - Hierarchical todo lists with remote sync

Tasks form a tree rooted at a single root task. Branch tasks group work,
leaf tasks are the things you actually do. The full list can be synced
against a remote store with last-write-wins merging.

Typical flow:
  ti add "Ship release"            ← new task under the root
  ti add "Write notes" -p <id>     ← subtask, parent becomes a branch
  ti queue                         ← actionable (leaf) tasks
  ti done <id>                     ← toggle completion
  ti sync                          ← exchange with the remote store
"#;

#[derive(Parser, Clone)]
#[command(name = "todo-iterator")]
#[command(about = "Hierarchical todo lists with remote last-write-wins sync")]
#[command(long_about = LONG_ABOUT)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output (-q)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output logs in JSON format
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Add a task under the root or a given parent
    Add {
        /// Task name
        name: String,

        /// Longer description (markdown supported)
        #[arg(short, long, default_value = "")]
        description: String,

        /// Parent task id (defaults to the root task)
        #[arg(short, long)]
        parent: Option<String>,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// List direct children of a task
    List {
        /// Parent task id (defaults to the root task)
        #[arg(short, long)]
        parent: Option<String>,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Print the whole task tree
    Tree {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Show actionable (leaf) tasks
    Queue {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Toggle a task's completion state
    Done {
        /// Task id
        id: String,
    },

    /// Remove a task and its whole subtree
    Remove {
        /// Task id
        id: String,
    },

    /// Exchange state with the remote store
    ///
    /// Fetches remote metadata first; when the remote changed since the
    /// last exchange its content is merged in before pushing.
    Sync {
        /// Force a full init cycle even if nothing changed
        #[arg(long)]
        full: bool,
    },

    /// Sign in to the remote store
    Login,

    /// Final sync, sign out and clear all local data
    Logout,

    /// Forget the last-sync marker without touching tasks
    Reset,

    /// Show task counts and sync status
    Status {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}
