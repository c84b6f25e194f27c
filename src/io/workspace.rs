use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::store::memory::StoreData;

/// Name of the directory that marks a workspace root
pub const WORKSPACE_DIR: &str = ".taskmirror";
pub const CONFIG_FILE: &str = "config.toml";
pub const STORE_FILE: &str = "store.json";

const CONFIG_TEMPLATE: &str = r#"# taskmirror workspace settings

[session]
# user = "alice"

[display]
date_format = "%a %d %b %Y"
time_format = "%H:%M"
show_completed = true

[log]
level = "warn"

[sync]
first_snapshot_timeout_ms = 2000
"#;

/// Error type for workspace file operations
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("not a taskmirror workspace: no .taskmirror/ directory found")]
    NotAWorkspace,
    #[error("workspace already initialized at {0}")]
    AlreadyInitialized(PathBuf),
    #[error("could not read {path}: {source}")]
    ReadError { path: PathBuf, source: io::Error },
    #[error("could not write {path}: {source}")]
    WriteError { path: PathBuf, source: io::Error },
    #[error("could not parse config.toml: {0}")]
    ConfigParseError(#[from] toml::de::Error),
    #[error("could not edit config.toml: {0}")]
    ConfigEditError(#[from] toml_edit::TomlError),
    #[error("could not parse {path}: {source}")]
    StoreParseError {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("could not serialize store: {0}")]
    StoreSerializeError(#[from] serde_json::Error),
}

/// Location of a workspace on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub root: PathBuf,
}

impl Workspace {
    /// The `.taskmirror/` directory
    pub fn dir(&self) -> PathBuf {
        self.root.join(WORKSPACE_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir().join(CONFIG_FILE)
    }

    pub fn store_path(&self) -> PathBuf {
        self.dir().join(STORE_FILE)
    }

    /// Read the store file. A missing file is an empty store.
    pub fn load_store(&self) -> Result<StoreData, WorkspaceError> {
        let path = self.store_path();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(StoreData::default()),
            Err(source) => return Err(WorkspaceError::ReadError { path, source }),
        };
        if text.trim().is_empty() {
            return Ok(StoreData::default());
        }
        serde_json::from_str(&text).map_err(|source| WorkspaceError::StoreParseError { path, source })
    }

    /// Write the store file atomically.
    pub fn save_store(&self, data: &StoreData) -> Result<(), WorkspaceError> {
        let path = self.store_path();
        let mut json = serde_json::to_string_pretty(data)?;
        json.push('\n');
        atomic_write(&path, json.as_bytes()).map_err(|source| WorkspaceError::WriteError {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), tasks = data.tasks.len(), "store saved");
        Ok(())
    }
}

/// Find the workspace by walking up from `start`, looking for a
/// `.taskmirror/` directory with a config file.
pub fn discover_workspace(start: &Path) -> Result<Workspace, WorkspaceError> {
    let mut current = start.to_path_buf();
    loop {
        let dir = current.join(WORKSPACE_DIR);
        if dir.is_dir() && dir.join(CONFIG_FILE).exists() {
            return Ok(Workspace { root: current });
        }
        if !current.pop() {
            return Err(WorkspaceError::NotAWorkspace);
        }
    }
}

/// Create a fresh workspace in `root` with a default config and an empty
/// store.
pub fn init_workspace(root: &Path) -> Result<Workspace, WorkspaceError> {
    let workspace = Workspace {
        root: root.to_path_buf(),
    };
    let dir = workspace.dir();
    if dir.join(CONFIG_FILE).exists() {
        return Err(WorkspaceError::AlreadyInitialized(root.to_path_buf()));
    }
    fs::create_dir_all(&dir).map_err(|source| WorkspaceError::WriteError {
        path: dir.clone(),
        source,
    })?;
    let config_path = workspace.config_path();
    atomic_write(&config_path, CONFIG_TEMPLATE.as_bytes()).map_err(|source| {
        WorkspaceError::WriteError {
            path: config_path,
            source,
        }
    })?;
    workspace.save_store(&StoreData::default())?;
    Ok(workspace)
}

/// Write `content` to `path` atomically using a temp file + rename.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
