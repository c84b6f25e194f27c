use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::NaiveDate;
use tracing::debug;

use super::scheduler::Scheduler;
use crate::model::item::PresentationItem;
use crate::model::task::Task;

/// Where the previous row's deadline fell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    /// Nothing emitted yet
    Start,
    Date(NaiveDate),
    NoDeadline,
}

/// Insert date separators into a deadline-ordered task list.
///
/// One separator opens each run of tasks due on the same calendar date, and
/// a single `None` separator opens the run of tasks without a deadline. The
/// input is expected to be sorted already (no-deadline tasks last); tasks
/// are never reordered or dropped.
pub fn section(tasks: &[Task]) -> Vec<PresentationItem> {
    let mut items = Vec::with_capacity(tasks.len() + tasks.len() / 2 + 1);
    let mut cursor = Cursor::Start;

    for task in tasks {
        let here = match task.deadline {
            Some(deadline) => Cursor::Date(deadline.date()),
            None => Cursor::NoDeadline,
        };
        if here != cursor {
            let date = match here {
                Cursor::Date(date) => Some(date),
                _ => None,
            };
            items.push(PresentationItem::separator(date));
            cursor = here;
        }
        items.push(PresentationItem::row(task.clone()));
    }

    items
}

/// Runs [`section`] on a background scheduler and hands the result back on
/// the UI scheduler.
///
/// Submissions are versioned. When a result arrives on the UI side and a
/// newer submission (or an [`invalidate`](Self::invalidate)) has happened
/// since, the result is stale and is dropped without calling back.
#[derive(Clone)]
pub struct Sectioner {
    background: Arc<dyn Scheduler>,
    ui: Arc<dyn Scheduler>,
    latest: Arc<AtomicU64>,
}

impl Sectioner {
    pub fn new(background: Arc<dyn Scheduler>, ui: Arc<dyn Scheduler>) -> Self {
        Sectioner {
            background,
            ui,
            latest: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Section `tasks` off the calling thread. `on_done` runs on the UI
    /// scheduler, and only if this is still the latest submission by then.
    /// Returns the submission's version.
    pub fn submit<F>(&self, tasks: Vec<Task>, on_done: F) -> u64
    where
        F: FnOnce(Vec<PresentationItem>) + Send + 'static,
    {
        let version = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let latest = self.latest.clone();
        let ui = self.ui.clone();

        self.background.execute(Box::new(move || {
            let items = section(&tasks);
            ui.execute(Box::new(move || {
                let current = latest.load(Ordering::SeqCst);
                if current != version {
                    debug!(version, current, "dropping stale sectioning result");
                    return;
                }
                on_done(items);
            }));
        }));

        version
    }

    /// Supersede any in-flight submission without starting a new one.
    pub fn invalidate(&self) {
        self.latest.fetch_add(1, Ordering::SeqCst);
    }

    /// Version of the most recent submission or invalidation
    pub fn latest_version(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }
}
