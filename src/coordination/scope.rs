//! Sync scope: owns the live parts of one consumer and releases them
//! together, in reverse registration order.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, info};

/// A component that holds a subscription, ticker or task.
pub trait Teardown: Send + Sync {
    /// Name used in logs
    fn component(&self) -> String;

    /// Release everything. Must tolerate repeated calls.
    fn teardown(&self);
}

#[derive(Default)]
pub struct SyncScope {
    components: Mutex<Vec<Arc<dyn Teardown>>>,
    closed: AtomicBool,
    teardowns: AtomicUsize,
}

impl SyncScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component. Registering into a closed scope tears the
    /// component down immediately.
    pub fn register(&self, component: Arc<dyn Teardown>) {
        let mut components = self.lock();
        // Checked under the lock so a concurrent teardown cannot miss the push.
        if self.closed.load(Ordering::SeqCst) {
            drop(components);
            debug!("Scope closed, releasing {} immediately", component.component());
            component.teardown();
            return;
        }
        debug!("Scope registered {}", component.component());
        components.push(component);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<dyn Teardown>>> {
        self.components.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of teardown passes that actually ran (0 or 1)
    pub fn teardown_count(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }

    /// Release every component, last registered first. Idempotent; returns
    /// the number of components released by this call.
    pub fn teardown(&self, reason: &str) -> usize {
        let start_time = Instant::now();
        let components: Vec<Arc<dyn Teardown>> = {
            let mut guard = self.lock();
            if self.closed.swap(true, Ordering::SeqCst) {
                return 0;
            }
            std::mem::take(&mut *guard)
        };
        let order: Vec<String> = components.iter().rev().map(|c| c.component()).collect();
        info!(
            "Tearing down {} components in order: {:?} (reason: {})",
            order.len(),
            order,
            reason
        );

        for component in components.iter().rev() {
            component.teardown();
        }

        self.teardowns.fetch_add(1, Ordering::SeqCst);
        info!(
            "Scope torn down in {}ms",
            start_time.elapsed().as_millis() as u64
        );
        components.len()
    }
}

impl Drop for SyncScope {
    fn drop(&mut self) {
        self.teardown("scope dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Teardown for Recorder {
        fn component(&self) -> String {
            self.name.to_string()
        }

        fn teardown(&self) {
            self.log.lock().unwrap().push(self.name);
        }
    }

    fn recorder(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Arc<dyn Teardown> {
        Arc::new(Recorder {
            name,
            log: Arc::clone(log),
        })
    }

    #[test]
    fn test_reverse_order_and_idempotent() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let scope = SyncScope::new();
        scope.register(recorder("subscription", &log));
        scope.register(recorder("combiner", &log));
        scope.register(recorder("poller", &log));

        assert_eq!(scope.teardown("test"), 3);
        assert_eq!(scope.teardown("again"), 0);
        assert_eq!(scope.teardown_count(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["poller", "combiner", "subscription"]);
    }

    #[test]
    fn test_drop_tears_down() {
        let log = Arc::new(Mutex::new(Vec::new()));
        {
            let scope = SyncScope::new();
            scope.register(recorder("a", &log));
        }
        assert_eq!(*log.lock().unwrap(), vec!["a"]);
    }

    #[test]
    fn test_register_after_close_releases_immediately() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let scope = SyncScope::new();
        scope.teardown("done");
        scope.register(recorder("late", &log));
        assert!(scope.is_empty());
        assert_eq!(*log.lock().unwrap(), vec!["late"]);
    }

    struct Counted(Arc<AtomicUsize>);

    impl Teardown for Counted {
        fn component(&self) -> String {
            "counted".to_string()
        }

        fn teardown(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_concurrent_register_and_teardown_releases_everything() {
        for _ in 0..20 {
            let released = Arc::new(AtomicUsize::new(0));
            let scope = SyncScope::new();

            std::thread::scope(|threads| {
                for _ in 0..4 {
                    threads.spawn(|| {
                        for _ in 0..100 {
                            scope.register(Arc::new(Counted(Arc::clone(&released))));
                        }
                    });
                }
                threads.spawn(|| scope.teardown("race"));
            });

            assert!(scope.is_closed());
            assert!(scope.is_empty());
            assert_eq!(released.load(Ordering::SeqCst), 400);
        }
    }
}
