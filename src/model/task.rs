use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A single task as mirrored from the remote `tasks` collection.
///
/// Subtasks are not embedded; they live in a separate collection under the
/// task and are fetched with their own query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Store-assigned document ID. `None` until the task has been saved.
    pub id: Option<String>,
    pub title: String,
    pub description: String,
    pub completed: bool,
    /// Local date-time the task is due, if any
    pub deadline: Option<NaiveDateTime>,
}

impl Task {
    /// Create an unsaved task (no ID, not completed, no deadline)
    pub fn new(title: impl Into<String>) -> Self {
        Task {
            id: None,
            title: title.into(),
            description: String::new(),
            completed: false,
            deadline: None,
        }
    }

    /// Builder-style helper to attach an ID
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Builder-style helper to set the deadline
    pub fn with_deadline(mut self, deadline: Option<NaiveDateTime>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Whether the task has been persisted
    pub fn is_saved(&self) -> bool {
        self.id.is_some()
    }
}

/// A checklist entry belonging to a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTask {
    /// Store-assigned document ID. `None` until the subtask has been saved.
    pub id: Option<String>,
    pub title: String,
    pub completed: bool,
}

impl SubTask {
    /// Create an unsaved subtask
    pub fn new(title: impl Into<String>, completed: bool) -> Self {
        SubTask {
            id: None,
            title: title.into(),
            completed,
        }
    }

    /// Copy of this subtask with a different title; the ID is kept
    pub fn with_title(&self, title: impl Into<String>) -> Self {
        SubTask {
            id: self.id.clone(),
            title: title.into(),
            completed: self.completed,
        }
    }

    /// Copy of this subtask with a different completion flag; the ID is kept
    pub fn with_completed(&self, completed: bool) -> Self {
        SubTask {
            id: self.id.clone(),
            title: self.title.clone(),
            completed,
        }
    }
}
