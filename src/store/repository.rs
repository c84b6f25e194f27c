use std::sync::Arc;

use chrono::NaiveDateTime;
use serde_json::Value;
use tracing::{info, warn};

use super::{
    CollectionPath, DEADLINE_FIELD, Document, Fields, OWNER_FIELD, RemoteCollection, StoreError,
};
use crate::model::task::{SubTask, Task};

/// Storage format for deadlines: ISO-8601 local date-time, fixed width so
/// string order matches chronological order.
const DEADLINE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
/// Shorter form accepted on read (seconds omitted)
const DEADLINE_FORMAT_SHORT: &str = "%Y-%m-%dT%H:%M";

// ---------------------------------------------------------------------------
// Document <-> model mapping
// ---------------------------------------------------------------------------

pub fn format_deadline(deadline: &NaiveDateTime) -> String {
    deadline.format(DEADLINE_FORMAT).to_string()
}

pub fn parse_deadline(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DEADLINE_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, DEADLINE_FORMAT_SHORT))
        .ok()
}

fn malformed(doc: &Document, reason: impl Into<String>) -> StoreError {
    StoreError::Malformed {
        id: doc.id.clone(),
        reason: reason.into(),
    }
}

fn string_field(doc: &Document, key: &str) -> Result<Option<String>, StoreError> {
    match doc.fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(malformed(doc, format!("{} is not a string", key))),
    }
}

fn bool_field(doc: &Document, key: &str) -> Result<bool, StoreError> {
    match doc.fields.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(malformed(doc, format!("{} is not a bool", key))),
    }
}

pub fn task_from_document(doc: &Document) -> Result<Task, StoreError> {
    let title = string_field(doc, "title")?.ok_or_else(|| malformed(doc, "missing title"))?;
    let deadline = match string_field(doc, DEADLINE_FIELD)? {
        Some(s) => Some(
            parse_deadline(&s).ok_or_else(|| malformed(doc, format!("bad deadline '{}'", s)))?,
        ),
        None => None,
    };
    Ok(Task {
        id: Some(doc.id.clone()),
        title,
        description: string_field(doc, "description")?.unwrap_or_default(),
        completed: bool_field(doc, "completed")?,
        deadline,
    })
}

pub fn subtask_from_document(doc: &Document) -> Result<SubTask, StoreError> {
    let title = string_field(doc, "title")?.ok_or_else(|| malformed(doc, "missing title"))?;
    Ok(SubTask {
        id: Some(doc.id.clone()),
        title,
        completed: bool_field(doc, "completed")?,
    })
}

/// Map a snapshot to tasks. Documents that fail to map are skipped and logged.
pub fn tasks_from_documents(docs: &[Document]) -> Vec<Task> {
    docs.iter()
        .filter_map(|doc| match task_from_document(doc) {
            Ok(task) => Some(task),
            Err(e) => {
                warn!("skipping task: {}", e);
                None
            }
        })
        .collect()
}

/// Map a snapshot to subtasks. Documents that fail to map are skipped and logged.
pub fn subtasks_from_documents(docs: &[Document]) -> Vec<SubTask> {
    docs.iter()
        .filter_map(|doc| match subtask_from_document(doc) {
            Ok(sub) => Some(sub),
            Err(e) => {
                warn!("skipping subtask: {}", e);
                None
            }
        })
        .collect()
}

pub fn task_fields(task: &Task, owner: &str) -> Fields {
    let mut fields = Fields::new();
    fields.insert("title".into(), Value::String(task.title.clone()));
    fields.insert("description".into(), Value::String(task.description.clone()));
    fields.insert("completed".into(), Value::Bool(task.completed));
    if let Some(deadline) = &task.deadline {
        fields.insert(DEADLINE_FIELD.into(), Value::String(format_deadline(deadline)));
    }
    fields.insert(OWNER_FIELD.into(), Value::String(owner.to_string()));
    fields
}

pub fn subtask_fields(subtask: &SubTask) -> Fields {
    let mut fields = Fields::new();
    fields.insert("title".into(), Value::String(subtask.title.clone()));
    fields.insert("completed".into(), Value::Bool(subtask.completed));
    fields
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// Typed writes for tasks and subtasks on top of a [`RemoteCollection`].
pub struct TasksRepository<C: RemoteCollection + ?Sized> {
    collection: Arc<C>,
}

impl<C: RemoteCollection + ?Sized> Clone for TasksRepository<C> {
    fn clone(&self) -> Self {
        TasksRepository {
            collection: self.collection.clone(),
        }
    }
}

impl<C: RemoteCollection + ?Sized> TasksRepository<C> {
    pub fn new(collection: Arc<C>) -> Self {
        TasksRepository { collection }
    }

    pub fn collection(&self) -> &Arc<C> {
        &self.collection
    }

    /// Insert or update a task owned by `owner`. A task without an ID gets
    /// one from the store. Returns the task ID.
    pub fn upsert_task(&self, task: &Task, owner: &str) -> Result<String, StoreError> {
        let action = if task.id.is_some() { "update" } else { "insert" };
        let id = self.collection.upsert(
            &CollectionPath::Tasks,
            task.id.as_deref(),
            task_fields(task, owner),
        )?;
        info!(task = %id, "{} task successful", action);
        Ok(id)
    }

    pub fn upsert_subtask(&self, parent_id: &str, subtask: &SubTask) -> Result<String, StoreError> {
        self.collection.upsert(
            &CollectionPath::Subtasks {
                parent_id: parent_id.to_string(),
            },
            subtask.id.as_deref(),
            subtask_fields(subtask),
        )
    }

    pub fn delete_subtask(&self, parent_id: &str, subtask_id: &str) -> Result<(), StoreError> {
        self.collection.delete(
            &CollectionPath::Subtasks {
                parent_id: parent_id.to_string(),
            },
            subtask_id,
        )
    }

    /// Delete a task along with all of its subtasks.
    ///
    /// `subtask_ids` are the subtasks known to the caller; the store has no
    /// cascading delete.
    pub fn delete_task(&self, task_id: &str, subtask_ids: &[String]) -> Result<(), StoreError> {
        for sub_id in subtask_ids {
            self.delete_subtask(task_id, sub_id)?;
        }
        self.collection.delete(&CollectionPath::Tasks, task_id)?;
        info!(task = %task_id, "delete task successful");
        Ok(())
    }

    /// Save a task and its subtask list in one go, deleting `removed`
    /// subtask IDs. Returns the task ID and the saved subtasks with their
    /// IDs filled in.
    pub fn save_task_with_subtasks(
        &self,
        task: &Task,
        owner: &str,
        subtasks: &[SubTask],
        removed: &[String],
    ) -> Result<(String, Vec<SubTask>), StoreError> {
        let task_id = self.upsert_task(task, owner)?;
        let mut saved = Vec::with_capacity(subtasks.len());
        for sub in subtasks {
            let id = self.upsert_subtask(&task_id, sub)?;
            saved.push(SubTask {
                id: Some(id),
                ..sub.clone()
            });
        }
        for id in removed {
            self.delete_subtask(&task_id, id)?;
        }
        Ok((task_id, saved))
    }
}
