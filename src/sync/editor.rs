use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use super::edit_buffer::{BufferChange, EditBuffer};
use super::scheduler::Scheduler;
use crate::model::task::{SubTask, Task};
use crate::store::repository::{TasksRepository, subtasks_from_documents, task_from_document};
use crate::store::{
    QueryDescriptor, RemoteCollection, Snapshot, SnapshotListener, StoreError, SubscriptionHandle,
};

/// Whether the editor accepts changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditMode {
    Edit,
    View,
}

/// Error type for task editing
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("task is open read-only")]
    ReadOnly,
    #[error("task {0} has not been loaded yet")]
    NotLoaded(String),
    #[error("deadline {deadline} is not after {now}")]
    DeadlineInPast {
        deadline: NaiveDateTime,
        now: NaiveDateTime,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Part {
    Task,
    Subtasks,
}

/// Draft fields changed locally before the task document arrived
#[derive(Debug, Default, Clone, Copy)]
struct Touched {
    title: bool,
    description: bool,
    completed: bool,
    deadline: bool,
}

impl Touched {
    /// `remote` with the locally edited fields of `local` laid over it
    fn merge(&self, local: &Task, mut remote: Task) -> Task {
        if self.title {
            remote.title = local.title.clone();
        }
        if self.description {
            remote.description = local.description.clone();
        }
        if self.completed {
            remote.completed = local.completed;
        }
        if self.deadline {
            remote.deadline = local.deadline;
        }
        remote
    }
}

#[derive(Default)]
struct EditorState {
    draft: Task,
    /// Task document received from the store, or the draft saved
    draft_loaded: bool,
    touched: Touched,
    buffer: EditBuffer,
    /// IDs of persisted subtasks the user removed, deleted on save
    removed: Vec<String>,
    task_handle: Option<SubscriptionHandle>,
    subtasks_handle: Option<SubscriptionHandle>,
}

impl EditorState {
    fn handle_slot(&mut self, part: Part) -> &mut Option<SubscriptionHandle> {
        match part {
            Part::Task => &mut self.task_handle,
            Part::Subtasks => &mut self.subtasks_handle,
        }
    }

    fn part_done(&self, part: Part) -> bool {
        match part {
            Part::Task => self.draft_loaded,
            Part::Subtasks => self.buffer.is_populated(),
        }
    }
}

struct Shared {
    collection: Arc<dyn RemoteCollection>,
    state: Mutex<EditorState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, EditorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn on_snapshot(&self, part: Part, snapshot: Snapshot) {
        let docs = match snapshot {
            Ok(docs) => docs,
            Err(e) => {
                warn!(?part, "error loading task details: {}", e);
                return;
            }
        };

        let finished = {
            let mut state = self.lock();
            if state.part_done(part) {
                // Local content already authoritative
                state.handle_slot(part).take()
            } else {
                match part {
                    Part::Task => match docs.first().map(task_from_document) {
                        Some(Ok(task)) => {
                            let merged = state.touched.merge(&state.draft, task);
                            state.draft = merged;
                            state.draft_loaded = true;
                        }
                        Some(Err(e)) => warn!("skipping task document: {}", e),
                        None => debug!("task document not there yet"),
                    },
                    Part::Subtasks if !docs.is_empty() => {
                        if let Err(e) = state.buffer.load(subtasks_from_documents(&docs)) {
                            debug!("subtasks already loaded: {}", e);
                        }
                    }
                    Part::Subtasks => debug!("no subtasks yet"),
                }
                if state.part_done(part) {
                    state.handle_slot(part).take()
                } else {
                    None
                }
            }
        };

        if let Some(handle) = finished {
            self.collection.unsubscribe(handle);
            debug!(?part, "first load done, stopped listening");
        }
    }
}

fn snapshot_listener(weak: Weak<Shared>, ui: Arc<dyn Scheduler>, part: Part) -> SnapshotListener {
    Arc::new(move |snapshot: Snapshot| {
        let weak = weak.clone();
        ui.execute(Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.on_snapshot(part, snapshot);
            }
        }));
    })
}

/// Draft of one task and its subtasks while the user views or edits it.
///
/// An existing task is fetched once: after the first snapshot that has
/// content, the editor stops listening so later remote changes never
/// overwrite what the user is typing. Changes reach the store only on
/// [`save`](Self::save).
pub struct TaskEditor {
    repo: TasksRepository<dyn RemoteCollection>,
    shared: Arc<Shared>,
    mode: EditMode,
}

impl TaskEditor {
    /// Open `task_id` for editing, or start a new task when `None`.
    pub fn open(
        collection: Arc<dyn RemoteCollection>,
        ui: Arc<dyn Scheduler>,
        task_id: Option<String>,
        mode: EditMode,
    ) -> Self {
        let mut state = EditorState::default();
        state.draft.id = task_id.clone();
        let shared = Arc::new(Shared {
            collection: collection.clone(),
            state: Mutex::new(state),
        });
        let editor = TaskEditor {
            repo: TasksRepository::new(collection),
            shared,
            mode,
        };
        if let Some(id) = task_id {
            editor.listen(Part::Task, QueryDescriptor::task(&id), ui.clone());
            editor.listen(Part::Subtasks, QueryDescriptor::subtasks(&id), ui);
        }
        editor
    }

    fn listen(&self, part: Part, query: QueryDescriptor, ui: Arc<dyn Scheduler>) {
        let listener = snapshot_listener(Arc::downgrade(&self.shared), ui, part);
        let handle = self.shared.collection.subscribe(&query, listener);

        // The initial snapshot may already have been handled
        let mut state = self.shared.lock();
        if state.part_done(part) {
            drop(state);
            self.shared.collection.unsubscribe(handle);
        } else {
            *state.handle_slot(part) = Some(handle);
        }
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    /// Copy of the current draft
    pub fn task(&self) -> Task {
        self.shared.lock().draft.clone()
    }

    /// Copy of the buffered subtasks
    pub fn subtasks(&self) -> Vec<SubTask> {
        self.shared.lock().buffer.snapshot()
    }

    /// Whether the task document has been received or the draft saved
    pub fn is_loaded(&self) -> bool {
        self.shared.lock().draft_loaded
    }

    /// Whether the editor still listens for the first snapshot
    pub fn is_listening(&self) -> bool {
        let state = self.shared.lock();
        state.task_handle.is_some() || state.subtasks_handle.is_some()
    }

    fn writable(&self) -> Result<MutexGuard<'_, EditorState>, EditorError> {
        match self.mode {
            EditMode::Edit => Ok(self.shared.lock()),
            EditMode::View => Err(EditorError::ReadOnly),
        }
    }

    fn edit_draft(&self, f: impl FnOnce(&mut Task, &mut Touched)) -> Result<(), EditorError> {
        let mut state = self.writable()?;
        let EditorState { draft, touched, .. } = &mut *state;
        f(draft, touched);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Draft
    // -----------------------------------------------------------------------

    pub fn set_title(&self, title: impl Into<String>) -> Result<(), EditorError> {
        let title = title.into();
        self.edit_draft(|t, touched| {
            t.title = title;
            touched.title = true;
        })
    }

    pub fn set_description(&self, description: impl Into<String>) -> Result<(), EditorError> {
        let description = description.into();
        self.edit_draft(|t, touched| {
            t.description = description;
            touched.description = true;
        })
    }

    pub fn set_completed(&self, completed: bool) -> Result<(), EditorError> {
        self.edit_draft(|t, touched| {
            t.completed = completed;
            touched.completed = true;
        })
    }

    /// Set the deadline; it must lie strictly after `now`.
    pub fn set_deadline(&self, deadline: NaiveDateTime, now: NaiveDateTime) -> Result<(), EditorError> {
        if self.mode == EditMode::View {
            return Err(EditorError::ReadOnly);
        }
        if deadline <= now {
            return Err(EditorError::DeadlineInPast { deadline, now });
        }
        self.edit_draft(|t, touched| {
            t.deadline = Some(deadline);
            touched.deadline = true;
        })
    }

    pub fn clear_deadline(&self) -> Result<(), EditorError> {
        self.edit_draft(|t, touched| {
            t.deadline = None;
            touched.deadline = true;
        })
    }

    // -----------------------------------------------------------------------
    // Subtasks
    // -----------------------------------------------------------------------

    pub fn add_subtask(&self, title: impl Into<String>) -> Result<BufferChange, EditorError> {
        Ok(self.writable()?.buffer.append(title, false))
    }

    pub fn set_subtask_title(&self, index: usize, title: impl Into<String>) -> Result<BufferChange, EditorError> {
        Ok(self.writable()?.buffer.set_title(index, title))
    }

    pub fn set_subtask_completed(&self, index: usize, completed: bool) -> Result<BufferChange, EditorError> {
        Ok(self.writable()?.buffer.set_completed(index, completed))
    }

    /// Remove a subtask from the draft. A persisted one is deleted from the
    /// store on the next save.
    pub fn remove_subtask(&self, index: usize) -> Result<BufferChange, EditorError> {
        let mut state = self.writable()?;
        let (removed, change) = state.buffer.remove(index);
        if let Some(id) = removed.id {
            state.removed.push(id);
        }
        Ok(change)
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Stop waiting for the first snapshot.
    pub fn close(&self) {
        let handles = {
            let mut state = self.shared.lock();
            [state.task_handle.take(), state.subtasks_handle.take()]
        };
        for handle in handles.into_iter().flatten() {
            self.shared.collection.unsubscribe(handle);
        }
    }

    /// Write the draft and its subtasks as `owner`'s task. Returns the task
    /// ID, assigned by the store on the first save.
    ///
    /// An existing task can only be saved once its document has arrived;
    /// before that the draft holds only the fields edited locally.
    pub fn save(&self, owner: &str) -> Result<String, EditorError> {
        if self.mode == EditMode::View {
            return Err(EditorError::ReadOnly);
        }
        {
            let state = self.shared.lock();
            if let Some(id) = &state.draft.id
                && !state.draft_loaded
            {
                return Err(EditorError::NotLoaded(id.clone()));
            }
        }
        self.close();

        let (draft, subtasks, removed) = {
            let state = self.shared.lock();
            (state.draft.clone(), state.buffer.snapshot(), state.removed.clone())
        };
        let (task_id, saved) = self
            .repo
            .save_task_with_subtasks(&draft, owner, &subtasks, &removed)?;

        let mut state = self.shared.lock();
        state.draft.id = Some(task_id.clone());
        state.draft_loaded = true;
        state.touched = Touched::default();
        state.buffer.replace(saved);
        state.removed.clear();
        Ok(task_id)
    }

    /// Delete the task and every subtask it had. Nothing happens for a task
    /// that was never saved.
    pub fn delete_task(&self) -> Result<(), EditorError> {
        if self.mode == EditMode::View {
            return Err(EditorError::ReadOnly);
        }
        self.close();

        let (task_id, subtask_ids) = {
            let state = self.shared.lock();
            let ids: Vec<String> = state
                .buffer
                .snapshot()
                .into_iter()
                .filter_map(|s| s.id)
                .chain(state.removed.iter().cloned())
                .collect();
            (state.draft.id.clone(), ids)
        };
        let Some(task_id) = task_id else {
            debug!("discarding unsaved task");
            return Ok(());
        };
        self.repo.delete_task(&task_id, &subtask_ids)?;
        info!(task = %task_id, "task deleted from editor");
        Ok(())
    }
}

impl Drop for TaskEditor {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryCollection;
    use crate::sync::scheduler::{Deferred, Immediate};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .and_then(|d| d.and_hms_opt(hour, 0, 0))
            .unwrap()
    }

    fn seeded() -> (Arc<MemoryCollection>, String) {
        let store = Arc::new(MemoryCollection::new());
        let repo = TasksRepository::new(store.clone());
        let (id, _) = repo
            .save_task_with_subtasks(
                &Task::new("Groceries").with_deadline(Some(at(3, 9))),
                "alice",
                &[SubTask::new("milk", false), SubTask::new("eggs", true)],
                &[],
            )
            .unwrap();
        (store, id)
    }

    #[test]
    fn existing_task_is_loaded_once_then_unsubscribed() {
        let (store, id) = seeded();
        let editor = TaskEditor::open(store.clone(), Arc::new(Immediate), Some(id.clone()), EditMode::Edit);

        assert!(editor.is_loaded());
        assert!(!editor.is_listening());
        assert_eq!(store.live_subscriptions(), 0);
        assert_eq!(editor.task().title, "Groceries");
        let titles: Vec<String> = editor.subtasks().into_iter().map(|s| s.title).collect();
        assert_eq!(titles, vec!["milk", "eggs"]);
    }

    #[test]
    fn remote_change_after_first_load_does_not_touch_draft() {
        let (store, id) = seeded();
        let editor = TaskEditor::open(store.clone(), Arc::new(Immediate), Some(id.clone()), EditMode::Edit);
        editor.set_title("Groceries for the week").unwrap();

        TasksRepository::new(store.clone())
            .upsert_task(&Task::new("Changed elsewhere").with_id(id), "alice")
            .unwrap();

        assert_eq!(editor.task().title, "Groceries for the week");
    }

    #[test]
    fn local_edits_win_over_late_first_snapshot() {
        let (store, id) = seeded();
        let ui = Arc::new(Deferred::new());
        let editor = TaskEditor::open(store.clone(), ui.clone(), Some(id), EditMode::Edit);
        assert!(editor.is_listening());

        editor.add_subtask("bread").unwrap();
        ui.run_all();

        let titles: Vec<String> = editor.subtasks().into_iter().map(|s| s.title).collect();
        assert_eq!(titles, vec!["bread"]);
        assert_eq!(editor.task().title, "Groceries");
        assert_eq!(store.live_subscriptions(), 0);
    }

    #[test]
    fn draft_edits_before_first_snapshot_keep_the_opened_task() {
        let (store, id) = seeded();
        let ui = Arc::new(Deferred::new());
        let editor = TaskEditor::open(store.clone(), ui.clone(), Some(id.clone()), EditMode::Edit);

        editor.set_completed(true).unwrap();
        assert_eq!(editor.task().id.as_deref(), Some(id.as_str()));
        assert!(!editor.is_loaded());
        ui.run_all();

        let task = editor.task();
        assert_eq!(task.title, "Groceries");
        assert!(task.completed);
        assert_eq!(task.deadline, Some(at(3, 9)));

        assert_eq!(editor.save("alice").unwrap(), id);
        let tasks = store.query(&QueryDescriptor::all_tasks());
        assert_eq!(tasks.len(), 1);
        assert_eq!(task_from_document(&tasks[0]).unwrap(), task);
    }

    #[test]
    fn save_before_the_task_arrives_is_refused() {
        let (store, id) = seeded();
        let ui = Arc::new(Deferred::new());
        let editor = TaskEditor::open(store.clone(), ui.clone(), Some(id.clone()), EditMode::Edit);
        editor.set_title("Half typed").unwrap();

        assert!(matches!(editor.save("alice"), Err(EditorError::NotLoaded(ref t)) if *t == id));
        let tasks = store.query(&QueryDescriptor::all_tasks());
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].fields["title"], "Groceries");

        ui.run_all();
        assert_eq!(editor.task().title, "Half typed");
        assert_eq!(editor.save("alice").unwrap(), id);
    }

    #[test]
    fn delete_before_first_snapshot_targets_the_opened_task() {
        let (store, id) = seeded();
        let ui = Arc::new(Deferred::new());
        let editor = TaskEditor::open(store.clone(), ui.clone(), Some(id.clone()), EditMode::Edit);

        editor.delete_task().unwrap();
        ui.run_all();

        assert!(store.query(&QueryDescriptor::task(&id)).is_empty());
        assert_eq!(store.live_subscriptions(), 0);
    }

    #[test]
    fn view_mode_rejects_changes() {
        let (store, id) = seeded();
        let editor = TaskEditor::open(store.clone(), Arc::new(Immediate), Some(id), EditMode::View);

        assert!(matches!(editor.set_title("x"), Err(EditorError::ReadOnly)));
        assert!(matches!(editor.add_subtask("x"), Err(EditorError::ReadOnly)));
        assert!(matches!(editor.remove_subtask(0), Err(EditorError::ReadOnly)));
        assert!(matches!(editor.save("alice"), Err(EditorError::ReadOnly)));
        assert!(matches!(editor.delete_task(), Err(EditorError::ReadOnly)));
        assert_eq!(editor.subtasks().len(), 2);
    }

    #[test]
    fn deadline_must_be_in_the_future() {
        let editor = TaskEditor::open(
            Arc::new(MemoryCollection::new()),
            Arc::new(Immediate),
            None,
            EditMode::Edit,
        );
        let now = at(10, 12);

        let err = editor.set_deadline(at(10, 12), now).unwrap_err();
        assert!(matches!(err, EditorError::DeadlineInPast { .. }));
        assert!(editor.set_deadline(at(9, 12), now).is_err());
        assert_eq!(editor.task().deadline, None);

        editor.set_deadline(at(11, 8), now).unwrap();
        assert_eq!(editor.task().deadline, Some(at(11, 8)));
        editor.clear_deadline().unwrap();
        assert_eq!(editor.task().deadline, None);
    }

    #[test]
    fn new_task_save_assigns_ids() {
        let store = Arc::new(MemoryCollection::new());
        let editor = TaskEditor::open(store.clone(), Arc::new(Immediate), None, EditMode::Edit);
        editor.set_title("Write report").unwrap();
        editor.add_subtask("outline").unwrap();
        editor.add_subtask("draft").unwrap();

        let id = editor.save("alice").unwrap();

        assert_eq!(editor.task().id.as_deref(), Some(id.as_str()));
        assert!(editor.subtasks().iter().all(|s| s.id.is_some()));
        assert_eq!(store.query(&QueryDescriptor::subtasks(&id)).len(), 2);
        let task = store.query(&QueryDescriptor::task(&id));
        assert_eq!(task[0].fields["user_uid"], "alice");
    }

    #[test]
    fn removed_subtasks_are_deleted_on_save() {
        let (store, id) = seeded();
        let editor = TaskEditor::open(store.clone(), Arc::new(Immediate), Some(id.clone()), EditMode::Edit);

        assert_eq!(editor.remove_subtask(0).unwrap(), BufferChange::Removed { index: 0 });
        assert_eq!(store.query(&QueryDescriptor::subtasks(&id)).len(), 2);

        editor.set_subtask_completed(0, false).unwrap();
        editor.save("alice").unwrap();

        let subtasks = subtasks_from_documents(&store.query(&QueryDescriptor::subtasks(&id)));
        assert_eq!(subtasks.len(), 1);
        assert_eq!(subtasks[0].title, "eggs");
        assert!(!subtasks[0].completed);
    }

    #[test]
    fn delete_task_removes_everything() {
        let (store, id) = seeded();
        let editor = TaskEditor::open(store.clone(), Arc::new(Immediate), Some(id.clone()), EditMode::Edit);
        editor.remove_subtask(1).unwrap();
        editor.delete_task().unwrap();

        assert!(store.query(&QueryDescriptor::task(&id)).is_empty());
        assert!(store.query(&QueryDescriptor::subtasks(&id)).is_empty());
        assert_eq!(store.data().subtasks.len(), 0);
    }

    #[test]
    fn failed_snapshot_keeps_waiting() {
        let (store, id) = seeded();
        store.fail_subscriptions(Some("offline"));
        let editor = TaskEditor::open(store.clone(), Arc::new(Immediate), Some(id), EditMode::Edit);
        assert!(!editor.is_loaded());
        assert!(editor.is_listening());

        drop(editor);
        assert_eq!(store.live_subscriptions(), 0);
    }
}
