use std::cmp::Ordering;
use std::sync::{Mutex, MutexGuard};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{
    CollectionPath, Document, Fields, OrderBy, QueryDescriptor, RemoteCollection, Snapshot,
    SnapshotListener, StoreError, SubscriptionHandle,
};

/// Serializable contents of a [`MemoryCollection`].
///
/// Maps keep insertion order so unordered queries return documents in the
/// order they were created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreData {
    /// Counter used to generate document IDs
    #[serde(default)]
    pub next_id: u64,
    #[serde(default)]
    pub tasks: IndexMap<String, Fields>,
    /// Subtask documents keyed by parent task ID
    #[serde(default)]
    pub subtasks: IndexMap<String, IndexMap<String, Fields>>,
}

/// Subscription lifecycle events, recorded in order.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Subscribed {
        handle: SubscriptionHandle,
        query: QueryDescriptor,
    },
    Unsubscribed {
        handle: SubscriptionHandle,
    },
}

struct Listener {
    query: QueryDescriptor,
    callback: SnapshotListener,
}

#[derive(Default)]
struct Inner {
    data: StoreData,
    listeners: IndexMap<u64, Listener>,
    next_handle: u64,
    max_live: usize,
    events: Vec<StoreEvent>,
    /// When set, new subscriptions receive this error instead of data
    failure: Option<String>,
}

/// An in-process [`RemoteCollection`].
///
/// Listeners are always invoked after the internal lock is released, so a
/// listener may call back into the collection.
#[derive(Default)]
pub struct MemoryCollection {
    inner: Mutex<Inner>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(data: StoreData) -> Self {
        MemoryCollection {
            inner: Mutex::new(Inner {
                data,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Copy of the current contents (for persisting)
    pub fn data(&self) -> StoreData {
        self.lock().data.clone()
    }

    /// Swap in new contents, e.g. after the backing file changed on disk,
    /// and push fresh snapshots to every live query.
    pub fn replace_data(&self, data: StoreData) {
        let pending = {
            let mut inner = self.lock();
            inner.data = data;
            collect_snapshots(&inner, |_| true)
        };
        deliver(pending);
    }

    /// Push `message` as an error to every live query.
    pub fn inject_error(&self, message: &str) {
        let pending: Vec<(SnapshotListener, Snapshot)> = {
            let inner = self.lock();
            inner
                .listeners
                .values()
                .map(|l| {
                    (
                        l.callback.clone(),
                        Err(StoreError::SubscriptionFailed(message.to_string())),
                    )
                })
                .collect()
        };
        deliver(pending);
    }

    /// Make subsequent subscriptions fail with `message` (`None` to clear).
    pub fn fail_subscriptions(&self, message: Option<&str>) {
        self.lock().failure = message.map(str::to_string);
    }

    /// Number of queries currently subscribed
    pub fn live_subscriptions(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Highest number of simultaneously live queries seen so far
    pub fn max_live_subscriptions(&self) -> usize {
        self.lock().max_live
    }

    /// Subscription lifecycle log
    pub fn events(&self) -> Vec<StoreEvent> {
        self.lock().events.clone()
    }

    /// Run a query once, without subscribing
    pub fn query(&self, query: &QueryDescriptor) -> Vec<Document> {
        run_query(&self.lock().data, query)
    }
}

impl RemoteCollection for MemoryCollection {
    fn subscribe(&self, query: &QueryDescriptor, listener: SnapshotListener) -> SubscriptionHandle {
        let (handle, initial) = {
            let mut inner = self.lock();
            inner.next_handle += 1;
            let handle = SubscriptionHandle(inner.next_handle);
            inner.listeners.insert(
                handle.0,
                Listener {
                    query: query.clone(),
                    callback: listener.clone(),
                },
            );
            inner.max_live = inner.max_live.max(inner.listeners.len());
            inner.events.push(StoreEvent::Subscribed {
                handle,
                query: query.clone(),
            });
            let initial = match &inner.failure {
                Some(message) => Err(StoreError::SubscriptionFailed(message.clone())),
                None => Ok(run_query(&inner.data, query)),
            };
            (handle, initial)
        };
        debug!(handle = handle.0, collection = %query.collection, "subscribed");
        listener(initial);
        handle
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        let mut inner = self.lock();
        if inner.listeners.shift_remove(&handle.0).is_some() {
            inner.events.push(StoreEvent::Unsubscribed { handle });
            debug!(handle = handle.0, "unsubscribed");
        }
    }

    fn upsert(
        &self,
        collection: &CollectionPath,
        id: Option<&str>,
        fields: Fields,
    ) -> Result<String, StoreError> {
        let (id, pending) = {
            let mut inner = self.lock();
            let id = match id {
                Some(id) if id.is_empty() => {
                    return Err(StoreError::Rejected("empty document id".into()));
                }
                Some(id) => id.to_string(),
                None => {
                    inner.data.next_id += 1;
                    let prefix = match collection {
                        CollectionPath::Tasks => "t",
                        CollectionPath::Subtasks { .. } => "s",
                    };
                    format!("{}{}", prefix, inner.data.next_id)
                }
            };
            documents_mut(&mut inner.data, collection).insert(id.clone(), fields);
            let pending = collect_snapshots(&inner, |q| q.collection == *collection);
            (id, pending)
        };
        deliver(pending);
        Ok(id)
    }

    fn delete(&self, collection: &CollectionPath, id: &str) -> Result<(), StoreError> {
        let pending = {
            let mut inner = self.lock();
            let removed = match collection {
                CollectionPath::Tasks => inner.data.tasks.shift_remove(id).is_some(),
                CollectionPath::Subtasks { parent_id } => {
                    let docs = inner.data.subtasks.get_mut(parent_id);
                    let removed = docs.is_some_and(|d| d.shift_remove(id).is_some());
                    if inner.data.subtasks.get(parent_id).is_some_and(|d| d.is_empty()) {
                        inner.data.subtasks.shift_remove(parent_id);
                    }
                    removed
                }
            };
            if !removed {
                return Ok(());
            }
            collect_snapshots(&inner, |q| q.collection == *collection)
        };
        deliver(pending);
        Ok(())
    }
}

fn documents_mut<'a>(data: &'a mut StoreData, collection: &CollectionPath) -> &'a mut IndexMap<String, Fields> {
    match collection {
        CollectionPath::Tasks => &mut data.tasks,
        CollectionPath::Subtasks { parent_id } => {
            data.subtasks.entry(parent_id.clone()).or_default()
        }
    }
}

fn collect_snapshots(
    inner: &Inner,
    affected: impl Fn(&QueryDescriptor) -> bool,
) -> Vec<(SnapshotListener, Snapshot)> {
    inner
        .listeners
        .values()
        .filter(|l| affected(&l.query))
        .map(|l| (l.callback.clone(), Ok(run_query(&inner.data, &l.query))))
        .collect()
}

fn deliver(pending: Vec<(SnapshotListener, Snapshot)>) {
    for (callback, snapshot) in pending {
        callback(snapshot);
    }
}

/// Evaluate a query against the stored documents
fn run_query(data: &StoreData, query: &QueryDescriptor) -> Vec<Document> {
    let empty = IndexMap::new();
    let docs = match &query.collection {
        CollectionPath::Tasks => &data.tasks,
        CollectionPath::Subtasks { parent_id } => data.subtasks.get(parent_id).unwrap_or(&empty),
    };

    let mut result: Vec<Document> = docs
        .iter()
        .filter(|(id, _)| query.document_id.as_ref().is_none_or(|want| want == *id))
        .filter(|(_, fields)| {
            query
                .filter
                .as_ref()
                .is_none_or(|f| fields.get(&f.field) == Some(&f.value))
        })
        .map(|(id, fields)| Document {
            id: id.clone(),
            fields: fields.clone(),
        })
        .collect();

    if let Some(order) = &query.order_by {
        // Stable, so ties keep insertion order
        result.sort_by(|a, b| compare_field(order, a, b));
    }
    result
}

fn compare_field(order: &OrderBy, a: &Document, b: &Document) -> Ordering {
    let a = a.fields.get(&order.field).filter(|v| !v.is_null());
    let b = b.fields.get(&order.field).filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => compare_values(a, b),
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn recorder() -> (SnapshotListener, Arc<Mutex<Vec<Snapshot>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener: SnapshotListener = Arc::new(move |s: Snapshot| sink.lock().unwrap().push(s));
        (listener, seen)
    }

    fn ids(snapshot: &Snapshot) -> Vec<String> {
        snapshot
            .as_ref()
            .unwrap()
            .iter()
            .map(|d| d.id.clone())
            .collect()
    }

    #[test]
    fn generated_ids_are_prefixed_by_collection() {
        let store = MemoryCollection::new();
        let t = store
            .upsert(&CollectionPath::Tasks, None, fields(json!({"title": "a"})))
            .unwrap();
        let s = store
            .upsert(
                &CollectionPath::Subtasks { parent_id: t.clone() },
                None,
                fields(json!({"title": "b"})),
            )
            .unwrap();
        assert_eq!(t, "t1");
        assert_eq!(s, "s2");
    }

    #[test]
    fn order_by_puts_missing_values_last_and_keeps_ties_stable() {
        let store = MemoryCollection::new();
        store
            .upsert(&CollectionPath::Tasks, Some("none1"), fields(json!({"user_uid": "u"})))
            .unwrap();
        store
            .upsert(
                &CollectionPath::Tasks,
                Some("late"),
                fields(json!({"user_uid": "u", "deadline": "2024-02-01T00:00:00"})),
            )
            .unwrap();
        store
            .upsert(&CollectionPath::Tasks, Some("none2"), fields(json!({"user_uid": "u", "deadline": null})))
            .unwrap();
        store
            .upsert(
                &CollectionPath::Tasks,
                Some("early"),
                fields(json!({"user_uid": "u", "deadline": "2024-01-01T00:00:00"})),
            )
            .unwrap();

        let docs = store.query(&QueryDescriptor::tasks_for_owner("u"));
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late", "none1", "none2"]);
    }

    #[test]
    fn owner_filter_excludes_other_users() {
        let store = MemoryCollection::new();
        store
            .upsert(&CollectionPath::Tasks, Some("a"), fields(json!({"user_uid": "alice"})))
            .unwrap();
        store
            .upsert(&CollectionPath::Tasks, Some("b"), fields(json!({"user_uid": "bob"})))
            .unwrap();
        let docs = store.query(&QueryDescriptor::tasks_for_owner("bob"));
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "b");
        assert_eq!(store.query(&QueryDescriptor::all_tasks()).len(), 2);
    }

    #[test]
    fn subscribe_delivers_initial_and_subsequent_snapshots() {
        let store = MemoryCollection::new();
        let (listener, seen) = recorder();
        let handle = store.subscribe(&QueryDescriptor::all_tasks(), listener);

        store
            .upsert(&CollectionPath::Tasks, Some("x"), fields(json!({"title": "x"})))
            .unwrap();
        store.delete(&CollectionPath::Tasks, "x").unwrap();

        {
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 3);
            assert!(ids(&seen[0]).is_empty());
            assert_eq!(ids(&seen[1]), vec!["x"]);
            assert!(ids(&seen[2]).is_empty());
        }

        store.unsubscribe(handle);
        store
            .upsert(&CollectionPath::Tasks, Some("y"), fields(json!({})))
            .unwrap();
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn writes_to_other_collections_do_not_notify() {
        let store = MemoryCollection::new();
        let (listener, seen) = recorder();
        store.subscribe(&QueryDescriptor::subtasks("t1"), listener);
        store
            .upsert(&CollectionPath::Tasks, Some("t1"), fields(json!({})))
            .unwrap();
        store
            .upsert(
                &CollectionPath::Subtasks { parent_id: "t2".into() },
                None,
                fields(json!({})),
            )
            .unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn deleting_missing_document_is_silent() {
        let store = MemoryCollection::new();
        let (listener, seen) = recorder();
        store.subscribe(&QueryDescriptor::all_tasks(), listener);
        store.delete(&CollectionPath::Tasks, "nope").unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn live_subscription_accounting() {
        let store = MemoryCollection::new();
        let (l1, _) = recorder();
        let (l2, _) = recorder();
        let h1 = store.subscribe(&QueryDescriptor::all_tasks(), l1);
        let h2 = store.subscribe(&QueryDescriptor::all_tasks(), l2);
        assert_eq!(store.live_subscriptions(), 2);
        store.unsubscribe(h1);
        store.unsubscribe(h1);
        store.unsubscribe(h2);
        assert_eq!(store.live_subscriptions(), 0);
        assert_eq!(store.max_live_subscriptions(), 2);
        assert_eq!(store.events().len(), 4);
    }

    #[test]
    fn failing_subscription_and_injected_errors() {
        let store = MemoryCollection::new();
        store.fail_subscriptions(Some("permission denied"));
        let (listener, seen) = recorder();
        store.subscribe(&QueryDescriptor::all_tasks(), listener);
        assert_eq!(
            seen.lock().unwrap()[0],
            Err(StoreError::SubscriptionFailed("permission denied".into()))
        );

        store.fail_subscriptions(None);
        let (listener, seen) = recorder();
        store.subscribe(&QueryDescriptor::all_tasks(), listener);
        store.inject_error("network");
        let seen = seen.lock().unwrap();
        assert!(seen[0].is_ok());
        assert_eq!(seen[1], Err(StoreError::SubscriptionFailed("network".into())));
    }

    #[test]
    fn replace_data_pushes_to_all_listeners() {
        let store = MemoryCollection::new();
        let (listener, seen) = recorder();
        store.subscribe(&QueryDescriptor::all_tasks(), listener);

        let mut data = StoreData::default();
        data.tasks.insert("z".into(), fields(json!({"title": "z"})));
        store.replace_data(data.clone());

        assert_eq!(ids(&seen.lock().unwrap()[1]), vec!["z"]);
        assert_eq!(store.data(), data);
    }

    #[test]
    fn empty_id_is_rejected() {
        let store = MemoryCollection::new();
        let err = store
            .upsert(&CollectionPath::Tasks, Some(""), Fields::new())
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
    }
}
