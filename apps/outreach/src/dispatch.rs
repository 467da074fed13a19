//! Background task dispatch for the pipeline stages.
//!
//! Stages (parse, match, drafts, execute) are spawned only after the store
//! call that wrote their subject row has returned, so the worker always sees
//! committed state. The dispatcher tracks how many tasks are in flight so
//! tests and graceful shutdown can wait for the pipeline to go quiet.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, Instrument};

#[derive(Clone)]
pub struct Dispatcher {
    in_flight: Arc<watch::Sender<usize>>,
}

/// Decrements the in-flight count when the task ends, including by panic.
struct InFlightGuard(Arc<watch::Sender<usize>>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0usize);
        Self {
            in_flight: Arc::new(tx),
        }
    }

    /// Spawns `task` on the runtime under a span named after `stage`.
    pub fn spawn<F>(&self, stage: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.in_flight.send_modify(|n| *n += 1);
        let guard = InFlightGuard(Arc::clone(&self.in_flight));
        debug!("Dispatching {stage} task");
        tokio::spawn(
            async move {
                let _guard = guard;
                task.await;
            }
            .instrument(tracing::info_span!("pipeline", stage)),
        );
    }

    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Resolves once no dispatched task is running. Tasks spawned by other
    /// tasks count too, so this waits for a whole cascade to finish.
    pub async fn wait_idle(&self) {
        let mut rx = self.in_flight.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

/// Cooperative shutdown flag observed by long-running loops at their sleeps.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Sleeps for `duration`. Returns false, early, if shutdown is triggered
    /// before the sleep completes.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let mut rx = self.rx.clone();
        if *rx.borrow_and_update() {
            return false;
        }
        let deadline = Instant::now() + duration;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return true,
                changed = rx.changed() => {
                    if changed.is_err() {
                        // Sender gone: nobody can trigger shutdown any more.
                        tokio::time::sleep_until(deadline).await;
                        return true;
                    }
                    if *rx.borrow_and_update() {
                        return false;
                    }
                }
            }
        }
    }

    /// Resolves when shutdown is triggered. Never resolves for `never()`.
    pub async fn triggered(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
