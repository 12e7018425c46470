//! Live query subscriptions.
//!
//! A [`SubscriptionHandle`] owns exactly one store registration. A
//! [`LiveQuery`] owns at most one handle at a time and publishes
//! `{data, loading, error}` on a watch channel that survives resubscription.
//!
//! Resubscription is driven by [`QueryKey`] equality, so rebuilding an equal
//! query never tears the listener down. Every handle gets a generation
//! number; the published state only accepts events from the current one.

use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapters::{
    DocumentStore, ListenerRegistration, RetryPolicy, SnapshotEvent, SnapshotSink, StoreRuntime,
};
use crate::coordination::Teardown;
use crate::domain::{CollectionQuery, LiveRecord, QueryKey};
use crate::error::SyncError;

/// What a consumer of one live query sees
#[derive(Debug, Clone)]
pub struct QueryState<T> {
    pub data: Arc<Vec<T>>,
    pub loading: bool,
    pub error: Option<SyncError>,
    /// Snapshots received by the current handle
    pub snapshots: u64,
    generation: u64,
}

impl<T> QueryState<T> {
    pub fn loading() -> Self {
        Self {
            data: Arc::new(Vec::new()),
            loading: true,
            error: None,
            snapshots: 0,
            generation: 0,
        }
    }

    pub fn ready(data: Vec<T>) -> Self {
        Self {
            data: Arc::new(data),
            loading: false,
            error: None,
            snapshots: 1,
            generation: 0,
        }
    }

    pub fn failed(error: SyncError) -> Self {
        Self {
            data: Arc::new(Vec::new()),
            loading: false,
            error: Some(error),
            snapshots: 0,
            generation: 0,
        }
    }
}

fn decode_snapshot<T: DeserializeOwned>(collection: &str, records: &[LiveRecord]) -> Vec<T> {
    records
        .iter()
        .filter_map(|record| match record.decode::<T>() {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Skipping undecodable record in '{}': {}", collection, e);
                None
            }
        })
        .collect()
}

/// One open store registration.
///
/// Not `Clone`: the registration is released exactly once, by
/// [`SubscriptionHandle::unsubscribe`] or on drop.
pub struct SubscriptionHandle {
    id: Uuid,
    key: QueryKey,
    registration: Mutex<Option<Box<dyn ListenerRegistration>>>,
    released: Arc<AtomicBool>,
}

impl SubscriptionHandle {
    /// Open `query` on `store`, delivering decoded snapshots into `state`
    /// for as long as its generation equals `generation`.
    pub fn open<T>(
        store: &dyn DocumentStore,
        query: &CollectionQuery,
        state: Weak<watch::Sender<QueryState<T>>>,
        generation: u64,
    ) -> crate::error::Result<Self>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        let key = query.key();
        let released = Arc::new(AtomicBool::new(false));

        let sink: SnapshotSink = {
            let released = Arc::clone(&released);
            let collection = query.collection.clone();
            Arc::new(move |event: SnapshotEvent| {
                if released.load(Ordering::SeqCst) {
                    return;
                }
                let Some(state) = state.upgrade() else {
                    return;
                };
                match event {
                    SnapshotEvent::Snapshot(records) => {
                        let data = Arc::new(decode_snapshot::<T>(&collection, &records));
                        state.send_if_modified(|s| {
                            if s.generation != generation {
                                return false;
                            }
                            s.data = data;
                            s.loading = false;
                            s.error = None;
                            s.snapshots += 1;
                            true
                        });
                    }
                    SnapshotEvent::Error(e) => {
                        warn!("Live query on '{}' failed: {}", collection, e);
                        state.send_if_modified(|s| {
                            if s.generation != generation {
                                return false;
                            }
                            s.loading = false;
                            s.error = Some(e);
                            true
                        });
                    }
                }
            })
        };

        let registration = store.listen(query, sink)?;
        info!("Subscribed {} ({}) via {}", key, id, store.name());

        Ok(Self {
            id,
            key,
            registration: Mutex::new(Some(registration)),
            released,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Release the registration. Returns `true` only for the call that
    /// actually released it.
    pub fn unsubscribe(&self) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        let registration = self
            .registration
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(mut registration) = registration {
            registration.remove();
        }
        info!("Unsubscribed {} ({})", self.key, self.id);
        true
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

struct Inner {
    store: Option<Arc<dyn DocumentStore>>,
    query: CollectionQuery,
    key: QueryKey,
    enabled: bool,
    handle: Option<SubscriptionHandle>,
    torn_down: bool,
}

/// A live query whose parameters may change over its lifetime.
pub struct LiveQuery<T> {
    state: Arc<watch::Sender<QueryState<T>>>,
    inner: Mutex<Inner>,
}

impl<T> LiveQuery<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Open against an already available store.
    pub fn with_store(store: Arc<dyn DocumentStore>, query: CollectionQuery, enabled: bool) -> Self {
        Self::build(Some(store), None, query, enabled)
    }

    /// Open against the runtime's store if it is ready. Otherwise the state
    /// carries `NotReady` (or the failure) and [`LiveQuery::retry`] may be
    /// called once the store comes up.
    pub fn open(runtime: &StoreRuntime, query: CollectionQuery, enabled: bool) -> Self {
        let readiness = runtime.readiness();
        Self::build(readiness.handle, readiness.error, query, enabled)
    }

    /// Await readiness with bounded retries, then open.
    pub async fn open_when_ready(
        runtime: &StoreRuntime,
        query: CollectionQuery,
        enabled: bool,
        policy: RetryPolicy,
    ) -> Self {
        if !enabled {
            return Self::build(None, None, query, false);
        }
        match runtime.wait_ready(policy).await {
            Ok(store) => Self::build(Some(store), None, query, enabled),
            Err(e) => Self::build(None, Some(e), query, enabled),
        }
    }

    fn build(
        store: Option<Arc<dyn DocumentStore>>,
        store_error: Option<SyncError>,
        query: CollectionQuery,
        enabled: bool,
    ) -> Self {
        let (state, _) = watch::channel(QueryState::loading());
        let live = Self {
            state: Arc::new(state),
            inner: Mutex::new(Inner {
                store,
                key: query.key(),
                query,
                enabled,
                handle: None,
                torn_down: false,
            }),
        };
        {
            let mut inner = live.lock();
            live.connect(&mut inner, store_error);
        }
        live
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Release the current handle and open a new one for `inner.query`.
    fn connect(&self, inner: &mut Inner, store_error: Option<SyncError>) {
        if let Some(handle) = inner.handle.take() {
            handle.unsubscribe();
        }

        let mut generation = 0;
        if !inner.enabled {
            self.state.send_modify(|s| {
                s.generation += 1;
                s.data = Arc::new(Vec::new());
                s.loading = false;
                s.error = None;
                s.snapshots = 0;
            });
            debug!("Live query {} disabled", inner.key);
            return;
        }

        let Some(store) = inner.store.clone() else {
            let error = store_error.unwrap_or(SyncError::NotReady);
            debug!("Live query {} not opened: {}", inner.key, error);
            self.state.send_modify(|s| {
                s.generation += 1;
                s.loading = false;
                s.error = Some(error);
            });
            return;
        };

        self.state.send_modify(|s| {
            s.generation += 1;
            generation = s.generation;
            s.loading = true;
            s.error = None;
            s.snapshots = 0;
        });

        match SubscriptionHandle::open::<T>(
            store.as_ref(),
            &inner.query,
            Arc::downgrade(&self.state),
            generation,
        ) {
            Ok(handle) => inner.handle = Some(handle),
            Err(e) => {
                warn!("Failed to open live query {}: {}", inner.key, e);
                self.state.send_if_modified(|s| {
                    if s.generation != generation {
                        return false;
                    }
                    s.loading = false;
                    s.error = Some(e);
                    true
                });
            }
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<QueryState<T>> {
        self.state.subscribe()
    }

    pub fn state(&self) -> QueryState<T> {
        self.state.borrow().clone()
    }

    pub fn query_key(&self) -> QueryKey {
        self.lock().key.clone()
    }

    pub fn is_subscribed(&self) -> bool {
        self.lock().handle.is_some()
    }

    /// Apply new parameters. Resubscribes only when the query key or the
    /// enabled flag changed; returns whether it did.
    pub fn update(&self, query: CollectionQuery, enabled: bool) -> bool {
        let mut inner = self.lock();
        if inner.torn_down {
            return false;
        }

        let key = query.key();
        if key == inner.key && enabled == inner.enabled {
            return false;
        }

        debug!("Live query changed: {} -> {}", inner.key, key);
        inner.query = query;
        inner.key = key;
        inner.enabled = enabled;
        self.connect(&mut inner, None);
        true
    }

    pub fn set_enabled(&self, enabled: bool) -> bool {
        let query = self.lock().query.clone();
        self.update(query, enabled)
    }

    /// Re-attempt opening after the store became ready. Returns `true` if a
    /// subscription is now open.
    pub fn retry(&self, runtime: &StoreRuntime) -> bool {
        let mut inner = self.lock();
        if inner.torn_down || inner.handle.is_some() || !inner.enabled {
            return inner.handle.is_some();
        }

        let readiness = runtime.readiness();
        if inner.store.is_none() {
            inner.store = readiness.handle;
        }
        self.connect(&mut inner, readiness.error);
        inner.handle.is_some()
    }

    /// Release the subscription for good. Idempotent.
    pub fn unsubscribe(&self) -> bool {
        let mut inner = self.lock();
        if inner.torn_down {
            return false;
        }
        inner.torn_down = true;
        // Bump the generation without notifying so late events are dropped.
        self.state.send_if_modified(|s| {
            s.generation += 1;
            false
        });
        if let Some(handle) = inner.handle.take() {
            handle.unsubscribe();
        }
        true
    }
}

impl<T> Teardown for LiveQuery<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn component(&self) -> String {
        format!("live-query {}", self.query_key())
    }

    fn teardown(&self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;
    use crate::domain::{Memo, MemoStatus, SortDirection};
    use serde_json::json;

    fn memo(id: &str, status: &str) -> LiveRecord {
        LiveRecord::new(id, json!({ "title": id, "status": status }))
    }

    fn pending_query() -> CollectionQuery {
        CollectionQuery::new("memos")
            .where_eq("status", "pending_review")
            .order_by("title", SortDirection::Asc)
    }

    fn store() -> (MemoryStore, Arc<dyn DocumentStore>) {
        let store = MemoryStore::new();
        let dyn_store: Arc<dyn DocumentStore> = Arc::new(store.clone());
        (store, dyn_store)
    }

    #[test]
    fn test_loading_until_first_snapshot_then_replaced() {
        let (store, dyn_store) = store();
        let live = LiveQuery::<Memo>::with_store(dyn_store, pending_query(), true);

        // MemoryStore answers synchronously with the initial (empty) result.
        let state = live.state();
        assert!(!state.loading);
        assert!(state.data.is_empty());

        store.put("memos", memo("a", "pending_review"));
        store.put("memos", memo("b", "approved"));
        store.put("memos", memo("c", "pending_review"));

        let state = live.state();
        let titles: Vec<&str> = state.data.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "c"]);
        assert!(state.data.iter().all(|m| m.status == MemoStatus::PendingReview));
        assert_eq!(state.snapshots, 4);
    }

    /// Holds every sink and only delivers when told to.
    #[derive(Default)]
    struct DeferredStore {
        sinks: Mutex<Vec<SnapshotSink>>,
    }

    impl DeferredStore {
        fn push(&self, event: SnapshotEvent) {
            let sinks = self.sinks.lock().unwrap().clone();
            for sink in sinks {
                sink(event.clone());
            }
        }
    }

    impl DocumentStore for DeferredStore {
        fn name(&self) -> &str {
            "deferred"
        }

        fn listen(
            &self,
            _query: &CollectionQuery,
            sink: SnapshotSink,
        ) -> crate::Result<Box<dyn ListenerRegistration>> {
            self.sinks.lock().unwrap().push(sink);
            Ok(Box::new(crate::adapters::CallbackRegistration::new(|| {})))
        }
    }

    #[test]
    fn test_loading_clears_on_first_push_and_stays_cleared() {
        let store = Arc::new(DeferredStore::default());
        let live = LiveQuery::<Memo>::with_store(store.clone(), pending_query(), true);

        let state = live.state();
        assert!(state.loading);
        assert!(state.data.is_empty());
        assert!(state.error.is_none());

        store.push(SnapshotEvent::Snapshot(Arc::new(vec![memo("a", "pending_review")])));
        let state = live.state();
        assert!(!state.loading);
        assert_eq!(state.data.len(), 1);

        store.push(SnapshotEvent::Error(SyncError::subscription("memos", "unavailable")));
        let state = live.state();
        assert!(!state.loading);
        assert_eq!(
            state.error,
            Some(SyncError::subscription("memos", "unavailable"))
        );
        assert_eq!(state.data.len(), 1);
    }

    #[test]
    fn test_first_error_also_clears_loading() {
        let store = Arc::new(DeferredStore::default());
        let live = LiveQuery::<Memo>::with_store(store.clone(), pending_query(), true);
        assert!(live.state().loading);

        store.push(SnapshotEvent::Error(SyncError::subscription("memos", "permission-denied")));
        let state = live.state();
        assert!(!state.loading);
        assert!(state.error.is_some());
    }

    #[test]
    fn test_equal_query_does_not_resubscribe() {
        let (store, dyn_store) = store();
        let live = LiveQuery::<Memo>::with_store(dyn_store, pending_query(), true);

        for _ in 0..5 {
            assert!(!live.update(pending_query(), true));
        }
        assert_eq!(store.listen_count(), 1);
        assert_eq!(store.remove_count(), 0);

        let approved = CollectionQuery::new("memos").where_eq("status", "approved");
        assert!(live.update(approved, true));
        assert_eq!(store.listen_count(), 2);
        assert_eq!(store.remove_count(), 1);
        assert_eq!(store.active_listeners(), 1);
    }

    #[test]
    fn test_disabled_opens_nothing() {
        let (store, dyn_store) = store();
        store.put("memos", memo("a", "pending_review"));
        let live = LiveQuery::<Memo>::with_store(dyn_store, pending_query(), false);

        let state = live.state();
        assert!(!state.loading);
        assert!(state.data.is_empty());
        assert_eq!(store.listen_count(), 0);

        assert!(live.set_enabled(true));
        assert_eq!(live.state().data.len(), 1);

        assert!(live.set_enabled(false));
        assert!(live.state().data.is_empty());
        assert_eq!(store.active_listeners(), 0);
    }

    #[test]
    fn test_handle_unsubscribe_is_idempotent() {
        let (store, dyn_store) = store();
        let (state, _rx) = watch::channel(QueryState::<Memo>::loading());
        let state = Arc::new(state);

        let handle = SubscriptionHandle::open::<Memo>(
            dyn_store.as_ref(),
            &pending_query(),
            Arc::downgrade(&state),
            0,
        )
        .unwrap();

        assert!(handle.unsubscribe());
        assert!(!handle.unsubscribe());
        drop(handle);
        assert_eq!(store.remove_count(), 1);
    }

    #[test]
    fn test_events_after_unsubscribe_are_dropped() {
        let (store, dyn_store) = store();
        let live = LiveQuery::<Memo>::with_store(dyn_store, CollectionQuery::new("memos"), true);
        store.put("memos", memo("a", "approved"));
        assert_eq!(live.state().data.len(), 1);

        assert!(live.unsubscribe());
        assert!(!live.unsubscribe());
        store.put("memos", memo("b", "approved"));

        assert_eq!(live.state().data.len(), 1);
        assert_eq!(store.remove_count(), 1);
        assert!(!live.update(pending_query(), true));
    }

    #[test]
    fn test_not_ready_store_then_retry() {
        let runtime = StoreRuntime::new();
        let live = LiveQuery::<Memo>::open(&runtime, pending_query(), true);

        let state = live.state();
        assert!(!state.loading);
        assert_eq!(state.error, Some(SyncError::NotReady));
        assert!(!live.retry(&runtime));

        let store = MemoryStore::new();
        store.put("memos", memo("a", "pending_review"));
        runtime.install(Arc::new(store.clone())).unwrap();

        assert!(live.retry(&runtime));
        let state = live.state();
        assert_eq!(state.error, None);
        assert_eq!(state.data.len(), 1);
        assert_eq!(store.listen_count(), 1);
    }

    #[test]
    fn test_server_error_surfaces_verbatim() {
        let (store, dyn_store) = store();
        let live = LiveQuery::<Memo>::with_store(dyn_store, pending_query(), true);
        store.fail_listeners("memos", "permission-denied");

        let state = live.state();
        assert!(!state.loading);
        assert_eq!(
            state.error,
            Some(SyncError::subscription("memos", "permission-denied"))
        );
    }

    #[test]
    fn test_undecodable_records_are_skipped() {
        let (store, dyn_store) = store();
        let live = LiveQuery::<Memo>::with_store(dyn_store, CollectionQuery::new("memos"), true);
        store.put_all(
            "memos",
            vec![
                memo("a", "approved"),
                LiveRecord::new("broken", json!({ "title": 7 })),
            ],
        );
        let state = live.state();
        assert_eq!(state.data.len(), 1);
        assert_eq!(state.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_when_ready_gives_not_ready_after_retries() {
        let runtime = StoreRuntime::new();
        let policy = RetryPolicy {
            attempts: 2,
            delay: std::time::Duration::from_millis(50),
        };
        let live = LiveQuery::<Memo>::open_when_ready(&runtime, pending_query(), true, policy).await;
        assert_eq!(live.state().error, Some(SyncError::NotReady));
        assert!(!live.is_subscribed());
    }

    #[test]
    fn test_equal_update_does_not_notify_receivers() {
        use tokio_test::{assert_pending, assert_ready, task};

        let (store, dyn_store) = store();
        let live = LiveQuery::<Memo>::with_store(dyn_store, pending_query(), true);
        let mut rx = live.subscribe();
        rx.borrow_and_update();

        let mut changed = task::spawn(rx.changed());
        assert_pending!(changed.poll());

        live.update(pending_query(), true);
        assert!(!changed.is_woken());

        store.put("memos", memo("a", "pending_review"));
        assert!(changed.is_woken());
        assert!(assert_ready!(changed.poll()).is_ok());
    }

    #[tokio::test]
    async fn test_receiver_sees_every_snapshot_in_order() {
        let (store, dyn_store) = store();
        let live = LiveQuery::<Memo>::with_store(dyn_store, CollectionQuery::new("memos"), true);
        let mut rx = live.subscribe();
        rx.borrow_and_update();

        store.put("memos", memo("a", "draft"));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().data.len(), 1);

        store.put("memos", memo("b", "draft"));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().data.len(), 2);
    }
}
