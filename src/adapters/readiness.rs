//! Process-wide document store handle with an explicit readiness state.
//!
//! `uninitialized → ready | failed`. Both end states are terminal; consumers
//! consult [`StoreRuntime::readiness`] or await [`StoreRuntime::wait_ready`]
//! before opening a live query.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, warn};

use super::DocumentStore;
use crate::error::{Result, SyncError};

#[derive(Clone)]
enum StoreState {
    Uninitialized,
    Ready(Arc<dyn DocumentStore>),
    Failed(String),
}

/// Snapshot of the readiness signal
#[derive(Clone)]
pub struct Readiness {
    pub is_initialized: bool,
    pub handle: Option<Arc<dyn DocumentStore>>,
    pub error: Option<SyncError>,
}

impl std::fmt::Debug for Readiness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Readiness")
            .field("is_initialized", &self.is_initialized)
            .field("handle", &self.handle.as_ref().map(|h| h.name().to_string()))
            .field("error", &self.error)
            .finish()
    }
}

/// Bounded wait used while the store comes up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_secs(1),
        }
    }
}

pub struct StoreRuntime {
    state: watch::Sender<StoreState>,
    init_started: AtomicBool,
    init_abandoned: Notify,
}

/// Releases the initialization claim if the factory future is dropped
/// before it completes.
struct InitGuard<'a> {
    runtime: &'a StoreRuntime,
    armed: bool,
}

impl Drop for InitGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Store initialization dropped before completing");
            self.runtime.init_started.store(false, Ordering::SeqCst);
            self.runtime.init_abandoned.notify_waiters();
        }
    }
}

static GLOBAL_RUNTIME: OnceLock<StoreRuntime> = OnceLock::new();

impl Default for StoreRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreRuntime {
    pub fn new() -> Self {
        let (state, _) = watch::channel(StoreState::Uninitialized);
        Self {
            state,
            init_started: AtomicBool::new(false),
            init_abandoned: Notify::new(),
        }
    }

    /// The process-wide runtime, created on first use
    pub fn global() -> &'static StoreRuntime {
        GLOBAL_RUNTIME.get_or_init(StoreRuntime::new)
    }

    fn current(&self) -> StoreState {
        self.state.borrow().clone()
    }

    pub fn readiness(&self) -> Readiness {
        match self.current() {
            StoreState::Uninitialized => Readiness {
                is_initialized: false,
                handle: None,
                error: None,
            },
            StoreState::Ready(handle) => Readiness {
                is_initialized: true,
                handle: Some(handle),
                error: None,
            },
            StoreState::Failed(reason) => Readiness {
                is_initialized: false,
                handle: None,
                error: Some(SyncError::StoreUnavailable(reason)),
            },
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.current(), StoreState::Ready(_))
    }

    /// Move `uninitialized → ready`.
    pub fn install(&self, store: Arc<dyn DocumentStore>) -> Result<()> {
        let name = store.name().to_string();
        let mut store = Some(store);
        let moved = self.state.send_if_modified(|state| {
            if matches!(state, StoreState::Uninitialized) {
                if let Some(store) = store.take() {
                    *state = StoreState::Ready(store);
                    return true;
                }
            }
            false
        });

        if moved {
            info!("Document store ready: {}", name);
            Ok(())
        } else {
            Err(SyncError::AlreadyInitialized)
        }
    }

    /// Move `uninitialized → failed`.
    pub fn fail(&self, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        let moved = self.state.send_if_modified(|state| {
            if matches!(state, StoreState::Uninitialized) {
                *state = StoreState::Failed(reason.clone());
                true
            } else {
                false
            }
        });

        if moved {
            error!("Document store failed to initialize: {}", reason);
            Ok(())
        } else {
            Err(SyncError::AlreadyInitialized)
        }
    }

    /// Lazily initialize the store. Only one caller runs its `factory` at a
    /// time; concurrent callers wait for its outcome. If the running
    /// initialization is dropped before it settles, a waiter takes over
    /// with its own factory.
    pub async fn initialize_with<F, Fut>(&self, factory: F) -> Result<Arc<dyn DocumentStore>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<dyn DocumentStore>>>,
    {
        let mut factory = Some(factory);
        loop {
            // Created before the flag check so a reset in between still wakes us.
            let abandoned = self.init_abandoned.notified();
            tokio::pin!(abandoned);

            if !self.init_started.swap(true, Ordering::SeqCst) {
                let factory = factory
                    .take()
                    .ok_or_else(|| SyncError::Internal("store factory already consumed".into()))?;
                let mut guard = InitGuard {
                    runtime: self,
                    armed: true,
                };
                let outcome = factory().await;
                guard.armed = false;

                return match outcome {
                    Ok(store) => {
                        self.install(Arc::clone(&store))?;
                        Ok(store)
                    }
                    Err(e) => {
                        let _ = self.fail(e.to_string());
                        Err(SyncError::StoreUnavailable(e.to_string()))
                    }
                };
            }

            let mut rx = self.state.subscribe();
            tokio::select! {
                settled = rx.wait_for(|s| !matches!(s, StoreState::Uninitialized)) => {
                    let settled = settled.map_err(|_| SyncError::Cancelled)?.clone();
                    return match settled {
                        StoreState::Ready(handle) => Ok(handle),
                        StoreState::Failed(reason) => Err(SyncError::StoreUnavailable(reason)),
                        StoreState::Uninitialized => Err(SyncError::NotReady),
                    };
                }
                _ = &mut abandoned => {
                    debug!("Store initialization abandoned, retrying");
                }
            }
        }
    }

    /// Wait for `ready`, checking at most `policy.attempts` times.
    pub async fn wait_ready(&self, policy: RetryPolicy) -> Result<Arc<dyn DocumentStore>> {
        let mut rx = self.state.subscribe();
        let attempts = policy.attempts.max(1);

        for attempt in 1..=attempts {
            let state = rx.borrow_and_update().clone();
            match state {
                StoreState::Ready(handle) => return Ok(handle),
                StoreState::Failed(reason) => return Err(SyncError::StoreUnavailable(reason)),
                StoreState::Uninitialized => {
                    debug!("Document store not ready (check {}/{})", attempt, attempts);
                }
            }

            if attempt < attempts {
                let _ = tokio::time::timeout(policy.delay, rx.changed()).await;
            }
        }

        Err(SyncError::NotReady)
    }
}
