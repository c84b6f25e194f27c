use std::fs;

use crate::io::workspace::{Workspace, WorkspaceError, atomic_write};
use crate::model::config::Config;
use crate::model::session::Session;

/// Read the workspace config, returning both the parsed config and the raw
/// toml_edit document for round-trip-safe editing.
pub fn read_config(workspace: &Workspace) -> Result<(Config, toml_edit::DocumentMut), WorkspaceError> {
    let config_path = workspace.config_path();
    let config_text = fs::read_to_string(&config_path).map_err(|e| WorkspaceError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;
    let config: Config = toml::from_str(&config_text)?;
    let doc: toml_edit::DocumentMut = config_text.parse()?;
    Ok((config, doc))
}

/// Write the config document back to disk, preserving formatting.
pub fn write_config(workspace: &Workspace, doc: &toml_edit::DocumentMut) -> Result<(), WorkspaceError> {
    let config_path = workspace.config_path();
    atomic_write(&config_path, doc.to_string().as_bytes()).map_err(|e| WorkspaceError::WriteError {
        path: config_path,
        source: e,
    })
}

/// Session recorded in the config
pub fn session_from_config(config: &Config) -> Session {
    match config.session.user.as_deref() {
        Some(user) if !user.trim().is_empty() => Session::signed_in(user.trim()),
        _ => Session::SignedOut,
    }
}

/// Set `[session] user` in the config document
pub fn set_session_user(doc: &mut toml_edit::DocumentMut, user: &str) {
    if !doc.contains_key("session") {
        doc["session"] = toml_edit::Item::Table(toml_edit::Table::new());
    }
    doc["session"]["user"] = toml_edit::value(user);
}

/// Remove `[session] user` from the config document, keeping the table
pub fn clear_session_user(doc: &mut toml_edit::DocumentMut) {
    if let Some(session) = doc.get_mut("session").and_then(|s| s.as_table_like_mut()) {
        session.remove("user");
    }
}
