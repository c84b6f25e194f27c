use tracing::warn;

use crate::model::task::SubTask;

/// What changed in an [`EditBuffer`], for driving the view that shows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferChange {
    /// First bulk load into an empty buffer
    RangeInserted { start: usize, len: usize },
    Inserted { index: usize },
    Removed { index: usize },
    Updated { index: usize },
    /// Everything replaced; redraw the whole list
    Reset,
}

/// Error type for edit buffer operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    #[error("refusing to load {incoming} subtasks over a buffer that already holds {held}")]
    Misuse { held: usize, incoming: usize },
}

/// Local working copy of a task's subtasks while the user edits them.
///
/// The first [`load`](Self::load) fills the buffer; from then on the buffer
/// is the source of truth, and later loads (typically a remote refresh
/// racing with the user's edits) are refused. Entries are owned copies, so
/// nothing outside can change them behind the buffer's back.
///
/// Index arguments must be in range; an out-of-range index panics.
#[derive(Debug, Default)]
pub struct EditBuffer {
    entries: Vec<SubTask>,
    populated: bool,
}

impl EditBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the buffer has been loaded or edited yet
    pub fn is_populated(&self) -> bool {
        self.populated
    }

    /// Fill the buffer from a snapshot, only if nothing has been loaded or
    /// edited yet. Otherwise the call is refused and the contents are kept.
    pub fn load(&mut self, items: Vec<SubTask>) -> Result<BufferChange, BufferError> {
        if self.populated || !self.entries.is_empty() {
            let err = BufferError::Misuse {
                held: self.entries.len(),
                incoming: items.len(),
            };
            warn!("{}", err);
            return Err(err);
        }
        let len = items.len();
        self.entries = items;
        self.populated = true;
        Ok(BufferChange::RangeInserted { start: 0, len })
    }

    /// Overwrite the contents unconditionally. Only for callers that know
    /// there are no local edits to lose.
    pub fn replace(&mut self, items: Vec<SubTask>) -> BufferChange {
        self.entries = items;
        self.populated = true;
        BufferChange::Reset
    }

    pub fn get(&self, index: usize) -> &SubTask {
        &self.entries[index]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add a new, unsaved subtask at the end
    pub fn append(&mut self, title: impl Into<String>, completed: bool) -> BufferChange {
        self.entries.push(SubTask::new(title, completed));
        self.populated = true;
        BufferChange::Inserted {
            index: self.entries.len() - 1,
        }
    }

    pub fn set_title(&mut self, index: usize, title: impl Into<String>) -> BufferChange {
        self.entries[index] = self.entries[index].with_title(title);
        self.populated = true;
        BufferChange::Updated { index }
    }

    pub fn set_completed(&mut self, index: usize, completed: bool) -> BufferChange {
        self.entries[index] = self.entries[index].with_completed(completed);
        self.populated = true;
        BufferChange::Updated { index }
    }

    /// Remove and return the entry at `index`
    pub fn remove(&mut self, index: usize) -> (SubTask, BufferChange) {
        let removed = self.entries.remove(index);
        self.populated = true;
        (removed, BufferChange::Removed { index })
    }

    /// Owned copy of the contents, for saving
    pub fn snapshot(&self) -> Vec<SubTask> {
        self.entries.clone()
    }
}
