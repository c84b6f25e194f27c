//! Contracts for the remote document store and the identity provider, plus
//! in-process implementations of both.
//!
//! The sync layer only talks to [`RemoteCollection`] and [`SessionStream`];
//! [`memory::MemoryCollection`] and [`session::SessionCell`] are the
//! implementations used by the CLI and the tests.

pub mod memory;
pub mod repository;
pub mod session;

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::model::session::Session;

/// Field map of a stored document
pub type Fields = serde_json::Map<String, Value>;

/// A document as returned by a query snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

/// Which collection a query or write targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CollectionPath {
    /// Top-level `tasks`
    Tasks,
    /// `tasks/{parent_id}/subtasks`
    Subtasks { parent_id: String },
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionPath::Tasks => write!(f, "tasks"),
            CollectionPath::Subtasks { parent_id } => write!(f, "tasks/{}/subtasks", parent_id),
        }
    }
}

/// Equality filter on a single field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

/// Ascending order on a field. Documents where the field is missing or null
/// sort after all others, keeping their relative order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
}

/// Describes a live query against one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    pub collection: CollectionPath,
    pub filter: Option<FieldFilter>,
    /// Restrict the result to a single document
    pub document_id: Option<String>,
    pub order_by: Option<OrderBy>,
}

/// Field holding the owning user's ID on task documents
pub const OWNER_FIELD: &str = "user_uid";
/// Field the task list is ordered by
pub const DEADLINE_FIELD: &str = "deadline";

impl QueryDescriptor {
    /// All tasks owned by `user_id`, earliest deadline first
    pub fn tasks_for_owner(user_id: &str) -> Self {
        QueryDescriptor {
            collection: CollectionPath::Tasks,
            filter: Some(FieldFilter {
                field: OWNER_FIELD.to_string(),
                value: Value::String(user_id.to_string()),
            }),
            document_id: None,
            order_by: Some(OrderBy {
                field: DEADLINE_FIELD.to_string(),
            }),
        }
    }

    /// Every task of every user, earliest deadline first
    pub fn all_tasks() -> Self {
        QueryDescriptor {
            collection: CollectionPath::Tasks,
            filter: None,
            document_id: None,
            order_by: Some(OrderBy {
                field: DEADLINE_FIELD.to_string(),
            }),
        }
    }

    /// A single task document
    pub fn task(task_id: &str) -> Self {
        QueryDescriptor {
            collection: CollectionPath::Tasks,
            filter: None,
            document_id: Some(task_id.to_string()),
            order_by: None,
        }
    }

    /// The subtasks of one task, in insertion order
    pub fn subtasks(parent_id: &str) -> Self {
        QueryDescriptor {
            collection: CollectionPath::Subtasks {
                parent_id: parent_id.to_string(),
            },
            filter: None,
            document_id: None,
            order_by: None,
        }
    }
}

/// Error type for store operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("subscription failed: {0}")]
    SubscriptionFailed(String),
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("malformed document {id}: {reason}")]
    Malformed { id: String, reason: String },
    #[error("write rejected: {0}")]
    Rejected(String),
}

/// Result delivered to a snapshot listener
pub type Snapshot = Result<Vec<Document>, StoreError>;

/// Callback receiving every snapshot of a live query. May be invoked from
/// any thread.
pub type SnapshotListener = Arc<dyn Fn(Snapshot) + Send + Sync>;

/// Token returned by [`RemoteCollection::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

/// A queryable, push-subscribable document collection.
pub trait RemoteCollection: Send + Sync {
    /// Start a live query. The listener receives the current result and then
    /// every change until [`unsubscribe`](Self::unsubscribe) is called.
    fn subscribe(&self, query: &QueryDescriptor, listener: SnapshotListener) -> SubscriptionHandle;

    /// Stop a live query. Unknown handles are ignored.
    fn unsubscribe(&self, handle: SubscriptionHandle);

    /// Replace the document `id`, or create a new document with a generated
    /// ID when `id` is `None`. Returns the document ID.
    fn upsert(
        &self,
        collection: &CollectionPath,
        id: Option<&str>,
        fields: Fields,
    ) -> Result<String, StoreError>;

    /// Delete a document. Deleting a missing document succeeds.
    fn delete(&self, collection: &CollectionPath, id: &str) -> Result<(), StoreError>;
}

/// Callback receiving session changes
pub type SessionListener = Arc<dyn Fn(Session) + Send + Sync>;

/// Token returned by [`SessionStream::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionSubscription(pub u64);

/// Observable sign-in state.
pub trait SessionStream: Send + Sync {
    /// Register a listener. It is called with the current session right
    /// away and again on every change.
    fn subscribe(&self, listener: SessionListener) -> SessionSubscription;

    fn unsubscribe(&self, subscription: SessionSubscription);
}
