mod init;
mod list;
mod session;
mod tasks;

pub use init::cmd_init;
pub use list::{cmd_list, cmd_show, cmd_watch};
pub use session::{cmd_login, cmd_logout};
pub use tasks::{cmd_add, cmd_done, cmd_edit, cmd_rm, cmd_sub};

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::cli::commands::*;
use crate::io::config_io::{self, session_from_config};
use crate::io::workspace::{self, Workspace, WorkspaceError};
use crate::logging;
use crate::model::config::Config;
use crate::model::session::Session;
use crate::store::memory::MemoryCollection;
use crate::store::{OWNER_FIELD, QueryDescriptor, StoreError};
use crate::sync::editor::{EditMode, TaskEditor};
use crate::sync::scheduler::Immediate;

/// Global override for the workspace directory (set by -C flag)
static WORKSPACE_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let json = cli.json;

    if let Some(ref dir) = cli.workspace_dir {
        let abs = std::fs::canonicalize(dir)
            .map_err(|e| format!("cannot resolve -C path '{}': {}", dir, e))?;
        WORKSPACE_DIR_OVERRIDE
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(abs);
    }

    let configured_level = discover_cwd()
        .ok()
        .and_then(|ws| config_io::read_config(&ws).ok())
        .map(|(config, _)| config.log.level);
    logging::init(cli.verbose, configured_level.as_deref());

    match cli.command {
        Commands::Init => cmd_init(),
        Commands::Login(args) => cmd_login(args),
        Commands::Logout => cmd_logout(),

        // Read commands
        Commands::List(args) => cmd_list(args, json),
        Commands::Show(args) => cmd_show(args, json),
        Commands::Watch(args) => cmd_watch(args, json),

        // Write commands
        Commands::Add(args) => cmd_add(args, json),
        Commands::Edit(args) => cmd_edit(args),
        Commands::Done(args) => cmd_done(args),
        Commands::Rm(args) => cmd_rm(args),
        Commands::Sub(args) => cmd_sub(args, json),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn start_dir() -> Result<PathBuf, WorkspaceError> {
    match WORKSPACE_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .as_ref()
    {
        Some(dir) => Ok(dir.clone()),
        None => std::env::current_dir().map_err(|e| WorkspaceError::ReadError {
            path: PathBuf::from("."),
            source: e,
        }),
    }
}

fn discover_cwd() -> Result<Workspace, WorkspaceError> {
    workspace::discover_workspace(&start_dir()?)
}

/// Everything a command needs: where the workspace is, its config, and the
/// store loaded from disk.
struct Context {
    workspace: Workspace,
    config: Config,
    store: Arc<MemoryCollection>,
}

impl Context {
    fn load() -> Result<Self, WorkspaceError> {
        let workspace = discover_cwd()?;
        let (config, _) = config_io::read_config(&workspace)?;
        let store = Arc::new(MemoryCollection::with_data(workspace.load_store()?));
        Ok(Context {
            workspace,
            config,
            store,
        })
    }

    fn session(&self) -> Session {
        session_from_config(&self.config)
    }

    fn require_user(&self) -> Result<String, Box<dyn std::error::Error>> {
        match self.session() {
            Session::SignedIn { user_id } => Ok(user_id),
            Session::SignedOut => Err("not signed in (run `tm login <user>`)".into()),
        }
    }

    /// Write the store back to disk
    fn persist(&self) -> Result<(), WorkspaceError> {
        self.workspace.save_store(&self.store.data())
    }

    /// Owner recorded on a task document
    fn owner_of(&self, task_id: &str) -> Result<Option<String>, StoreError> {
        let docs = self.store.query(&QueryDescriptor::task(task_id));
        let doc = docs
            .first()
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;
        Ok(doc
            .fields
            .get(OWNER_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    /// Open an existing task. Editing requires the signed-in user to own it.
    fn open(&self, task_id: &str, mode: EditMode) -> Result<TaskEditor, Box<dyn std::error::Error>> {
        let owner = self.owner_of(task_id)?;
        if mode == EditMode::Edit {
            let user = self.require_user()?;
            if owner.as_deref() != Some(user.as_str()) {
                return Err(format!("task {} belongs to another user", task_id).into());
            }
        }
        Ok(TaskEditor::open(
            self.store.clone(),
            Arc::new(Immediate),
            Some(task_id.to_string()),
            mode,
        ))
    }
}

/// Parse a deadline from the command line. A bare date means the end of
/// that day.
fn parse_deadline_arg(s: &str) -> Result<NaiveDateTime, String> {
    let s = s.trim();
    for fmt in ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(23, 59, 0))
        .ok_or_else(|| format!("invalid deadline '{}' (expected YYYY-MM-DD [HH:MM])", s))
}

fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}
