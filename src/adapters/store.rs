//! Query surface of the external document store.
//!
//! The store pushes full result sets; this crate never writes back.

use std::sync::Arc;

use crate::domain::{CollectionQuery, Snapshot};
use crate::error::{Result, SyncError};

/// One push from the store to a listener
#[derive(Debug, Clone)]
pub enum SnapshotEvent {
    /// Complete matching result set, replacing any earlier one
    Snapshot(Snapshot),
    /// Server rejected or terminated the query
    Error(SyncError),
}

/// Callback invoked for every push on one listener, in emission order.
pub type SnapshotSink = Arc<dyn Fn(SnapshotEvent) + Send + Sync>;

/// Releases one listener. Implementations must tolerate repeated calls.
pub trait ListenerRegistration: Send {
    fn remove(&mut self);
}

pub trait DocumentStore: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Open a live query. The sink may be invoked before this returns.
    fn listen(
        &self,
        query: &CollectionQuery,
        sink: SnapshotSink,
    ) -> Result<Box<dyn ListenerRegistration>>;
}

/// Registration backed by a one-shot release closure.
pub struct CallbackRegistration {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl CallbackRegistration {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }
}

impl ListenerRegistration for CallbackRegistration {
    fn remove(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_callback_registration_releases_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut reg = CallbackRegistration::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        reg.remove();
        reg.remove();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
