use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tm", about = concat!("taskmirror v", env!("CARGO_PKG_VERSION"), " - your task list, mirrored"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Run against a different workspace directory
    #[arg(short = 'C', long = "workspace-dir", global = true)]
    pub workspace_dir: Option<String>,

    /// More logging on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new workspace in the current directory
    Init,
    /// Sign in as a user
    Login(LoginArgs),
    /// Sign out
    Logout,
    /// List your tasks, grouped by deadline date
    List(ListArgs),
    /// Show a task with its subtasks
    Show(IdArg),
    /// Add a task
    Add(AddArgs),
    /// Change a task's fields
    Edit(EditArgs),
    /// Mark a task done
    Done(DoneArgs),
    /// Delete a task and its subtasks
    Rm(IdArg),
    /// Manage subtasks
    Sub(SubCmd),
    /// Follow the task list, printing every change as it arrives
    Watch(WatchArgs),
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct LoginArgs {
    /// User ID
    pub user: String,
}

// ---------------------------------------------------------------------------
// Read command args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct ListArgs {
    /// Every user's tasks, not just yours
    #[arg(long)]
    pub all: bool,
}

#[derive(Args)]
pub struct IdArg {
    /// Task ID
    pub id: String,
}

#[derive(Args)]
pub struct WatchArgs {
    /// Every user's tasks, ignoring sign-in changes
    #[arg(long)]
    pub all: bool,
    /// Stop after this many milliseconds (default: run until interrupted)
    #[arg(long = "for", value_name = "MS")]
    pub duration_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Write command args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct AddArgs {
    /// Task title
    pub title: String,
    /// Longer description
    #[arg(long, short = 'd')]
    pub description: Option<String>,
    /// Deadline, e.g. "2024-06-01 18:00" (must be in the future)
    #[arg(long)]
    pub deadline: Option<String>,
}

#[derive(Args)]
pub struct EditArgs {
    /// Task ID
    pub id: String,
    /// New title
    #[arg(long)]
    pub title: Option<String>,
    /// New description
    #[arg(long, short = 'd')]
    pub description: Option<String>,
    /// New deadline (must be in the future)
    #[arg(long, conflicts_with = "no_deadline")]
    pub deadline: Option<String>,
    /// Remove the deadline
    #[arg(long)]
    pub no_deadline: bool,
}

#[derive(Args)]
pub struct DoneArgs {
    /// Task ID
    pub id: String,
    /// Mark as not done instead
    #[arg(long)]
    pub undo: bool,
}

// ---------------------------------------------------------------------------
// Subtasks
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct SubCmd {
    #[command(subcommand)]
    pub action: SubAction,
}

#[derive(Subcommand)]
pub enum SubAction {
    /// List a task's subtasks
    List(IdArg),
    /// Add a subtask
    Add(SubAddArgs),
    /// Mark a subtask done
    Done(SubDoneArgs),
    /// Rename a subtask
    Title(SubTitleArgs),
    /// Remove a subtask
    Rm(SubIndexArgs),
}

#[derive(Args)]
pub struct SubAddArgs {
    /// Parent task ID
    pub id: String,
    /// Subtask title
    pub title: String,
}

#[derive(Args)]
pub struct SubIndexArgs {
    /// Parent task ID
    pub id: String,
    /// Subtask position, as shown by `tm sub list`
    pub index: usize,
}

#[derive(Args)]
pub struct SubDoneArgs {
    /// Parent task ID
    pub id: String,
    /// Subtask position
    pub index: usize,
    /// Mark as not done instead
    #[arg(long)]
    pub undo: bool,
}

#[derive(Args)]
pub struct SubTitleArgs {
    /// Parent task ID
    pub id: String,
    /// Subtask position
    pub index: usize,
    /// New title
    pub title: String,
}
