use crate::io::workspace::{self, WORKSPACE_DIR};

use super::start_dir;

pub fn cmd_init() -> Result<(), Box<dyn std::error::Error>> {
    let cwd = start_dir()?;

    // Warn about an enclosing workspace
    if let Some(parent) = cwd.parent()
        && let Ok(outer) = workspace::discover_workspace(parent)
    {
        eprintln!("Note: enclosing workspace found at {}/", outer.dir().display());
        eprintln!("Creating new workspace in ./{}/", WORKSPACE_DIR);
    }

    let ws = workspace::init_workspace(&cwd)?;
    println!("Initialized taskmirror workspace in {}/", ws.dir().display());
    Ok(())
}
