//! Combine-latest over three watch channels.
//!
//! The reducer runs once at spawn time and again every time any input
//! publishes. Watch receivers always expose the newest value, so each output
//! is computed from the latest state of every input.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::coordination::Teardown;

pub struct Combiner<O> {
    name: &'static str,
    output: watch::Receiver<O>,
    task: JoinHandle<()>,
    stopped: AtomicBool,
}

impl<O> Combiner<O>
where
    O: Clone + Send + Sync + 'static,
{
    pub fn spawn<A, B, C, F>(
        name: &'static str,
        mut a: watch::Receiver<A>,
        mut b: watch::Receiver<B>,
        mut c: watch::Receiver<C>,
        mut reduce: F,
    ) -> Self
    where
        A: Clone + Send + Sync + 'static,
        B: Clone + Send + Sync + 'static,
        C: Clone + Send + Sync + 'static,
        F: FnMut(&A, &B, &C) -> O + Send + 'static,
    {
        let initial = {
            let (va, vb, vc) = (
                a.borrow_and_update().clone(),
                b.borrow_and_update().clone(),
                c.borrow_and_update().clone(),
            );
            reduce(&va, &vb, &vc)
        };
        let (tx, output) = watch::channel(initial);

        let task = tokio::spawn(async move {
            loop {
                let changed = tokio::select! {
                    r = a.changed() => r,
                    r = b.changed() => r,
                    r = c.changed() => r,
                };
                if changed.is_err() {
                    debug!("{}: input closed, stopping", name);
                    break;
                }

                let va = a.borrow_and_update().clone();
                let vb = b.borrow_and_update().clone();
                let vc = c.borrow_and_update().clone();
                tx.send_replace(reduce(&va, &vb, &vc));
            }
        });

        info!("{} started", name);
        Self {
            name,
            output,
            task,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<O> {
        self.output.clone()
    }

    pub fn current(&self) -> O {
        self.output.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst) && !self.task.is_finished()
    }

    /// Abort the combining task. Idempotent.
    pub fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.task.abort();
        info!("{} stopped", self.name);
        true
    }
}

impl<O> Drop for Combiner<O> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl<O> Teardown for Combiner<O>
where
    O: Clone + Send + Sync + 'static,
{
    fn component(&self) -> String {
        self.name.to_string()
    }

    fn teardown(&self) {
        self.stop();
    }
}
