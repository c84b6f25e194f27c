use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, info, warn};

use super::scheduler::Scheduler;
use crate::model::session::Session;
use crate::model::task::Task;
use crate::store::repository::tasks_from_documents;
use crate::store::{
    QueryDescriptor, RemoteCollection, SessionStream, SessionSubscription, Snapshot,
    SnapshotListener, SubscriptionHandle,
};

/// Signal sent downstream of a task query.
///
/// Before the first signal the list is still loading; `NoData` is an
/// explicit "nothing to show" (signed out, or the query failed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskFeed {
    NoData,
    Tasks(Vec<Task>),
}

/// Receives feed signals, always on the UI scheduler
pub type FeedSink = Arc<dyn Fn(TaskFeed) + Send + Sync>;

struct ActiveScope {
    user_id: String,
    handle: SubscriptionHandle,
}

#[derive(Default)]
struct SwitcherState {
    /// Last session acted on, for ignoring repeats
    last_session: Option<Session>,
    current: Option<ActiveScope>,
    /// Bumped on every scope change; snapshots from older generations are dropped
    generation: u64,
    /// Bumped on every stop; session jobs queued under an older epoch are dropped
    session_epoch: u64,
    sessions: Option<(Arc<dyn SessionStream>, SessionSubscription)>,
}

struct Shared {
    collection: Arc<dyn RemoteCollection>,
    ui: Arc<dyn Scheduler>,
    sink: FeedSink,
    state: Mutex<SwitcherState>,
}

/// Keeps exactly one live subscription to "all tasks of the signed-in
/// user", switching it whenever the session changes.
///
/// The old subscription is always torn down before the new one is opened,
/// and any push still in flight from the old one is discarded, so data from
/// two users never reaches the sink interleaved.
pub struct ScopedQuerySwitcher {
    shared: Arc<Shared>,
}

impl ScopedQuerySwitcher {
    pub fn new(collection: Arc<dyn RemoteCollection>, ui: Arc<dyn Scheduler>, sink: FeedSink) -> Self {
        ScopedQuerySwitcher {
            shared: Arc::new(Shared {
                collection,
                ui,
                sink,
                state: Mutex::new(SwitcherState::default()),
            }),
        }
    }

    /// Start following `sessions`. Calling `start` again replaces the
    /// previous session source.
    pub fn start(&self, sessions: Arc<dyn SessionStream>) {
        self.stop();

        let epoch = self.shared.lock().session_epoch;
        let weak = Arc::downgrade(&self.shared);
        let ui = self.shared.ui.clone();
        let subscription = sessions.subscribe(Arc::new(move |session: Session| {
            let weak = weak.clone();
            ui.execute(Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.on_session(epoch, session);
                }
            }));
        }));
        self.shared.lock().sessions = Some((sessions, subscription));
    }

    /// Stop following the session and tear down the current subscription.
    pub fn stop(&self) {
        let (sessions, scope) = {
            let mut state = self.shared.lock();
            state.generation += 1;
            state.session_epoch += 1;
            state.last_session = None;
            (state.sessions.take(), state.current.take())
        };
        if let Some((stream, subscription)) = sessions {
            stream.unsubscribe(subscription);
        }
        if let Some(scope) = scope {
            self.shared.collection.unsubscribe(scope.handle);
            info!(user = %scope.user_id, "stopped task subscription");
        }
    }

    /// User whose tasks are currently subscribed
    pub fn live_scope(&self) -> Option<String> {
        self.shared.lock().current.as_ref().map(|s| s.user_id.clone())
    }
}

impl Drop for ScopedQuerySwitcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SwitcherState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn on_session(self: &Arc<Self>, epoch: u64, session: Session) {
        let (previous, generation) = {
            let mut state = self.lock();
            if state.session_epoch != epoch {
                debug!(?session, "dropping session change queued before stop");
                return;
            }
            if state.last_session.as_ref() == Some(&session) {
                debug!(?session, "session unchanged");
                return;
            }
            state.last_session = Some(session.clone());
            state.generation += 1;
            (state.current.take(), state.generation)
        };

        if let Some(scope) = previous {
            self.collection.unsubscribe(scope.handle);
            info!(user = %scope.user_id, "tore down task subscription");
        }

        match session {
            Session::SignedOut => (self.sink)(TaskFeed::NoData),
            Session::SignedIn { user_id } => {
                let listener = snapshot_listener(Arc::downgrade(self), self.ui.clone(), generation);
                let handle = self
                    .collection
                    .subscribe(&QueryDescriptor::tasks_for_owner(&user_id), listener);
                info!(user = %user_id, "subscribed to tasks");

                let mut state = self.lock();
                if state.generation == generation {
                    state.current = Some(ActiveScope { user_id, handle });
                } else {
                    // Superseded while subscribing
                    drop(state);
                    self.collection.unsubscribe(handle);
                }
            }
        }
    }

    fn on_snapshot(&self, generation: u64, snapshot: Snapshot) {
        if self.lock().generation != generation {
            debug!(generation, "dropping snapshot from a torn-down subscription");
            return;
        }
        (self.sink)(feed_from_snapshot(snapshot));
    }
}

fn snapshot_listener(weak: Weak<Shared>, ui: Arc<dyn Scheduler>, generation: u64) -> SnapshotListener {
    Arc::new(move |snapshot: Snapshot| {
        let weak = weak.clone();
        ui.execute(Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.on_snapshot(generation, snapshot);
            }
        }));
    })
}

fn feed_from_snapshot(snapshot: Snapshot) -> TaskFeed {
    match snapshot {
        Ok(docs) => TaskFeed::Tasks(tasks_from_documents(&docs)),
        Err(e) => {
            warn!("error getting list of tasks: {}", e);
            TaskFeed::NoData
        }
    }
}

// ---------------------------------------------------------------------------
// Unscoped listing
// ---------------------------------------------------------------------------

struct UnscopedState {
    handle: Option<SubscriptionHandle>,
    generation: u64,
}

struct UnscopedShared {
    collection: Arc<dyn RemoteCollection>,
    sink: FeedSink,
    state: Mutex<UnscopedState>,
}

/// Read-only subscription to every user's tasks, independent of the session.
pub struct UnscopedQuery {
    shared: Arc<UnscopedShared>,
    ui: Arc<dyn Scheduler>,
}

impl UnscopedQuery {
    pub fn new(collection: Arc<dyn RemoteCollection>, ui: Arc<dyn Scheduler>, sink: FeedSink) -> Self {
        UnscopedQuery {
            shared: Arc::new(UnscopedShared {
                collection,
                sink,
                state: Mutex::new(UnscopedState {
                    handle: None,
                    generation: 0,
                }),
            }),
            ui,
        }
    }

    fn lock(&self) -> MutexGuard<'_, UnscopedState> {
        self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn start(&self) {
        self.stop();
        let generation = self.lock().generation;

        let weak = Arc::downgrade(&self.shared);
        let ui = self.ui.clone();
        let listener: SnapshotListener = Arc::new(move |snapshot: Snapshot| {
            let weak = weak.clone();
            ui.execute(Box::new(move || {
                let Some(shared) = weak.upgrade() else { return };
                let current = shared.state.lock().unwrap_or_else(|e| e.into_inner()).generation;
                if current == generation {
                    (shared.sink)(feed_from_snapshot(snapshot));
                }
            }));
        });
        let handle = self
            .shared
            .collection
            .subscribe(&QueryDescriptor::all_tasks(), listener);
        self.lock().handle = Some(handle);
    }

    pub fn stop(&self) {
        let handle = {
            let mut state = self.lock();
            state.generation += 1;
            state.handle.take()
        };
        if let Some(handle) = handle {
            self.shared.collection.unsubscribe(handle);
        }
    }
}

impl Drop for UnscopedQuery {
    fn drop(&mut self) {
        self.stop();
    }
}
