use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::warn;

use crate::io::workspace::{CONFIG_FILE, STORE_FILE};

/// Events sent from the file watcher to the `watch` loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceEvent {
    /// The store file was written (possibly by another `tm` process).
    StoreChanged,
    /// config.toml changed; the signed-in user may be different.
    ConfigChanged,
}

/// Watches `.taskmirror/` for changes to the store and config files.
///
/// The directory is watched rather than the files, since atomic writes
/// replace a file with a new inode.
pub struct WorkspaceWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<WorkspaceEvent>,
}

impl WorkspaceWatcher {
    pub fn start(workspace_dir: &Path) -> Result<Self, notify::Error> {
        let (tx, rx) = mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| {
                let event = match result {
                    Ok(e) => e,
                    Err(e) => {
                        warn!("watch error: {}", e);
                        return;
                    }
                };

                match event.kind {
                    EventKind::Create(_) | EventKind::Modify(_) => {}
                    _ => return,
                }

                for path in &event.paths {
                    let kind = match path.file_name().and_then(|n| n.to_str()) {
                        Some(STORE_FILE) => WorkspaceEvent::StoreChanged,
                        Some(CONFIG_FILE) => WorkspaceEvent::ConfigChanged,
                        _ => continue,
                    };
                    let _ = tx.send(kind);
                }
            },
            Config::default(),
        )?;

        watcher.watch(workspace_dir, RecursiveMode::NonRecursive)?;
        Ok(WorkspaceWatcher {
            _watcher: watcher,
            rx,
        })
    }

    /// Non-blocking poll for pending events, with repeats collapsed.
    pub fn poll(&self) -> Vec<WorkspaceEvent> {
        let mut events = Vec::new();
        while let Ok(evt) = self.rx.try_recv() {
            if !events.contains(&evt) {
                events.push(evt);
            }
        }
        events
    }

    /// Block up to `timeout` for the next event, then drain whatever else
    /// arrived with it.
    pub fn wait(&self, timeout: Duration) -> Vec<WorkspaceEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(first) => {
                let mut events = vec![first];
                for evt in self.poll() {
                    if !events.contains(&evt) {
                        events.push(evt);
                    }
                }
                events
            }
            Err(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn unrelated_files_are_ignored() {
        let tmp = TempDir::new().unwrap();
        let watcher = WorkspaceWatcher::start(tmp.path()).unwrap();
        fs::write(tmp.path().join("notes.txt"), "hi").unwrap();
        let events = watcher.wait(Duration::from_millis(300));
        assert!(events.is_empty());
    }
}
