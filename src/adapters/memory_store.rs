//! In-process document store.
//!
//! Evaluates queries locally and pushes a fresh snapshot to every listener
//! on the written collection. Pushes happen synchronously on the writer's
//! thread, in write order.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::debug;

use super::{DocumentStore, ListenerRegistration, SnapshotEvent, SnapshotSink};
use crate::domain::{CollectionQuery, LiveRecord};
use crate::error::{Result, SyncError};

struct Listener {
    query: CollectionQuery,
    sink: SnapshotSink,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, BTreeMap<String, LiveRecord>>,
    listeners: BTreeMap<u64, Listener>,
    next_listener_id: u64,
}

#[derive(Default)]
struct Shared {
    inner: Mutex<Inner>,
    listen_calls: AtomicUsize,
    remove_calls: AtomicUsize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace one record, then push to listeners.
    pub fn put(&self, collection: &str, record: LiveRecord) {
        self.put_all(collection, vec![record]);
    }

    /// Insert or replace several records as one write (one push per listener).
    pub fn put_all(&self, collection: &str, records: Vec<LiveRecord>) {
        {
            let mut inner = self.shared.lock();
            let docs = inner.collections.entry(collection.to_string()).or_default();
            for record in records {
                docs.insert(record.id.clone(), record);
            }
        }
        self.notify(collection);
    }

    /// Replace the whole collection content as one write.
    pub fn replace(&self, collection: &str, records: Vec<LiveRecord>) {
        {
            let mut inner = self.shared.lock();
            let docs = inner.collections.entry(collection.to_string()).or_default();
            docs.clear();
            for record in records {
                docs.insert(record.id.clone(), record);
            }
        }
        self.notify(collection);
    }

    pub fn delete(&self, collection: &str, id: &str) -> bool {
        let removed = {
            let mut inner = self.shared.lock();
            inner
                .collections
                .get_mut(collection)
                .and_then(|docs| docs.remove(id))
                .is_some()
        };
        if removed {
            self.notify(collection);
        }
        removed
    }

    /// Terminate every listener on `collection` with an error, as a server
    /// rejecting the query would. Terminated listeners receive nothing further.
    pub fn fail_listeners(&self, collection: &str, message: &str) -> usize {
        let failed: Vec<SnapshotSink> = {
            let mut inner = self.shared.lock();
            let ids: Vec<u64> = inner
                .listeners
                .iter()
                .filter(|(_, l)| l.query.collection == collection)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| inner.listeners.remove(&id))
                .map(|l| l.sink)
                .collect()
        };

        for sink in &failed {
            sink(SnapshotEvent::Error(SyncError::subscription(collection, message)));
        }
        failed.len()
    }

    /// Number of `listen` calls served
    pub fn listen_count(&self) -> usize {
        self.shared.listen_calls.load(Ordering::SeqCst)
    }

    /// Number of registrations actually released
    pub fn remove_count(&self) -> usize {
        self.shared.remove_calls.load(Ordering::SeqCst)
    }

    pub fn active_listeners(&self) -> usize {
        self.shared.lock().listeners.len()
    }

    fn notify(&self, collection: &str) {
        // Evaluate under the lock, deliver outside it.
        let deliveries: Vec<(SnapshotSink, Vec<LiveRecord>)> = {
            let inner = self.shared.lock();
            let empty = BTreeMap::new();
            let docs = inner.collections.get(collection).unwrap_or(&empty);
            inner
                .listeners
                .values()
                .filter(|l| l.query.collection == collection)
                .map(|l| (Arc::clone(&l.sink), l.query.apply(docs.values())))
                .collect()
        };

        debug!(
            "memory store: pushing '{}' to {} listeners",
            collection,
            deliveries.len()
        );
        for (sink, records) in deliveries {
            sink(SnapshotEvent::Snapshot(Arc::new(records)));
        }
    }
}

struct MemoryRegistration {
    shared: Weak<Shared>,
    id: u64,
    removed: bool,
}

impl ListenerRegistration for MemoryRegistration {
    fn remove(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        if let Some(shared) = self.shared.upgrade() {
            shared.lock().listeners.remove(&self.id);
            shared.remove_calls.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl DocumentStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn listen(
        &self,
        query: &CollectionQuery,
        sink: SnapshotSink,
    ) -> Result<Box<dyn ListenerRegistration>> {
        self.shared.listen_calls.fetch_add(1, Ordering::SeqCst);

        let (id, initial) = {
            let mut inner = self.shared.lock();
            let id = inner.next_listener_id;
            inner.next_listener_id += 1;
            let initial = inner
                .collections
                .get(&query.collection)
                .map(|docs| query.apply(docs.values()))
                .unwrap_or_default();
            inner.listeners.insert(
                id,
                Listener {
                    query: query.clone(),
                    sink: Arc::clone(&sink),
                },
            );
            (id, initial)
        };

        // The store answers every new listener with the current result set.
        sink(SnapshotEvent::Snapshot(Arc::new(initial)));

        Ok(Box::new(MemoryRegistration {
            shared: Arc::downgrade(&self.shared),
            id,
            removed: false,
        }))
    }
}
