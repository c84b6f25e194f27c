use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::debug;

use super::differ::{DiffOp, diff};
use super::scheduler::Schedulers;
use super::sectioner::Sectioner;
use super::switcher::{FeedSink, ScopedQuerySwitcher, TaskFeed, UnscopedQuery};
use crate::model::item::PresentationItem;
use crate::store::{RemoteCollection, SessionStream};

/// What the task list view should currently show
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListState {
    /// Nothing received yet
    Loading,
    /// Signed out, or the query failed
    NoData,
    Items(Arc<[PresentationItem]>),
}

impl ListState {
    pub fn items(&self) -> &[PresentationItem] {
        match self {
            ListState::Items(items) => items,
            ListState::Loading | ListState::NoData => &[],
        }
    }
}

/// A new list state plus the edit script from the previous one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRefresh {
    pub state: ListState,
    pub ops: Vec<DiffOp>,
}

/// Receives list refreshes on the UI scheduler.
pub trait ListObserver: Send + Sync {
    fn on_refresh(&self, refresh: &ListRefresh);
}

impl<F> ListObserver for F
where
    F: Fn(&ListRefresh) + Send + Sync,
{
    fn on_refresh(&self, refresh: &ListRefresh) {
        self(refresh)
    }
}

struct Core {
    sectioner: Sectioner,
    observer: Arc<dyn ListObserver>,
    state: Mutex<ListState>,
}

impl Core {
    fn lock(&self) -> MutexGuard<'_, ListState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn on_feed(self: &Arc<Self>, feed: TaskFeed) {
        match feed {
            TaskFeed::NoData => {
                self.sectioner.invalidate();
                self.publish(ListState::NoData);
            }
            TaskFeed::Tasks(tasks) => {
                let weak = Arc::downgrade(self);
                let version = self.sectioner.submit(tasks, move |items| {
                    if let Some(core) = weak.upgrade() {
                        core.publish(ListState::Items(items.into()));
                    }
                });
                debug!(version, "submitted tasks for sectioning");
            }
        }
    }

    fn publish(&self, next: ListState) {
        let refresh = {
            let mut state = self.lock();
            let ops = diff(state.items(), next.items());
            *state = next.clone();
            ListRefresh { state: next, ops }
        };
        self.observer.on_refresh(&refresh);
    }
}

/// The task list's data path: session → scoped query → sectioning on a
/// background thread → diff → [`ListObserver`] on the UI thread.
pub struct TaskListPipeline {
    collection: Arc<dyn RemoteCollection>,
    schedulers: Schedulers,
    core: Arc<Core>,
    scoped: Option<ScopedQuerySwitcher>,
    unscoped: Option<UnscopedQuery>,
}

impl TaskListPipeline {
    pub fn new(
        collection: Arc<dyn RemoteCollection>,
        schedulers: Schedulers,
        observer: Arc<dyn ListObserver>,
    ) -> Self {
        let sectioner = Sectioner::new(schedulers.background.clone(), schedulers.ui.clone());
        TaskListPipeline {
            collection,
            schedulers,
            core: Arc::new(Core {
                sectioner,
                observer,
                state: Mutex::new(ListState::Loading),
            }),
            scoped: None,
            unscoped: None,
        }
    }

    fn sink(&self) -> FeedSink {
        let weak: Weak<Core> = Arc::downgrade(&self.core);
        Arc::new(move |feed: TaskFeed| {
            if let Some(core) = weak.upgrade() {
                core.on_feed(feed);
            }
        })
    }

    /// Show the signed-in user's tasks, following session changes.
    pub fn start(&mut self, sessions: Arc<dyn SessionStream>) {
        self.stop();
        let switcher =
            ScopedQuerySwitcher::new(self.collection.clone(), self.schedulers.ui.clone(), self.sink());
        switcher.start(sessions);
        self.scoped = Some(switcher);
    }

    /// Show every user's tasks, read-only.
    pub fn start_unscoped(&mut self) {
        self.stop();
        let query =
            UnscopedQuery::new(self.collection.clone(), self.schedulers.ui.clone(), self.sink());
        query.start();
        self.unscoped = Some(query);
    }

    pub fn stop(&mut self) {
        if let Some(switcher) = self.scoped.take() {
            switcher.stop();
        }
        if let Some(query) = self.unscoped.take() {
            query.stop();
        }
        self.core.sectioner.invalidate();
    }

    /// Last state delivered to the observer
    pub fn state(&self) -> ListState {
        self.core.lock().clone()
    }

    /// User whose tasks are shown, when following the session
    pub fn live_scope(&self) -> Option<String> {
        self.scoped.as_ref().and_then(|s| s.live_scope())
    }
}

impl Drop for TaskListPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
