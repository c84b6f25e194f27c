use chrono::NaiveDate;
use serde::Serialize;

use super::task::Task;

/// One row of the sectioned task list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PresentationItem {
    /// Header opening a run of tasks due on `date`, or the run of tasks
    /// without a deadline when `date` is `None`
    DateSeparator { date: Option<NaiveDate> },
    /// A task
    TaskRow { task: Task },
}

impl PresentationItem {
    pub fn separator(date: Option<NaiveDate>) -> Self {
        PresentationItem::DateSeparator { date }
    }

    pub fn row(task: Task) -> Self {
        PresentationItem::TaskRow { task }
    }

    /// Whether `self` and `other` occupy the same list slot, i.e. one could
    /// be an updated version of the other.
    ///
    /// Separators match on date. Rows match on task ID; rows for tasks that
    /// were never saved have no identity, so they only match an identical row.
    pub fn same_slot(&self, other: &PresentationItem) -> bool {
        match (self, other) {
            (
                PresentationItem::DateSeparator { date: a },
                PresentationItem::DateSeparator { date: b },
            ) => a == b,
            (PresentationItem::TaskRow { task: a }, PresentationItem::TaskRow { task: b }) => {
                match (&a.id, &b.id) {
                    (Some(x), Some(y)) => x == y,
                    (None, None) => a == b,
                    _ => false,
                }
            }
            _ => false,
        }
    }

    /// The task carried by a row, if this is a row
    pub fn task(&self) -> Option<&Task> {
        match self {
            PresentationItem::TaskRow { task } => Some(task),
            PresentationItem::DateSeparator { .. } => None,
        }
    }
}
