//! Bounded task pool keyed by attachment identity.
//!
//! At most one task per identity exists at a time. The identity stays in the
//! in-flight set until its task has finished, including the task's last status
//! write, so a later pass that still sees the old state skips it instead of
//! launching a duplicate.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use kubedbg_api::AttachmentRef;
use tokio::sync::{Notify, Semaphore};
use tracing::{Instrument, Span};

/// Result of [`TaskPool::try_launch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launch {
    /// The task was spawned.
    Started,
    /// A task for this identity is still running.
    AlreadyInFlight,
}

#[derive(Default)]
struct Shared {
    in_flight: Mutex<HashSet<AttachmentRef>>,
    idle: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, HashSet<AttachmentRef>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the identity when the task ends, even if it panicked.
struct InFlightGuard {
    shared: Arc<Shared>,
    reference: AttachmentRef,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut in_flight = self.shared.lock();
        in_flight.remove(&self.reference);
        let now_idle = in_flight.is_empty();
        drop(in_flight);
        if now_idle {
            self.shared.idle.notify_waiters();
        }
    }
}

/// Runs attach/remove work off the reconciliation pass.
#[derive(Clone)]
pub struct TaskPool {
    shared: Arc<Shared>,
    permits: Arc<Semaphore>,
    span: Span,
}

impl TaskPool {
    /// Create a pool running at most `max_concurrent` tasks at once.
    pub fn new(max_concurrent: usize, span: Span) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            span,
        }
    }

    /// Spawn `task` for `reference` unless one is already running.
    ///
    /// Never waits: when all permits are taken the task is spawned and queues
    /// for a permit on its own.
    pub fn try_launch<F>(&self, reference: AttachmentRef, task: F) -> Launch
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if !self.shared.lock().insert(reference.clone()) {
            return Launch::AlreadyInFlight;
        }

        let guard = InFlightGuard {
            shared: Arc::clone(&self.shared),
            reference,
        };
        let permits = Arc::clone(&self.permits);
        tokio::spawn(
            async move {
                let _guard = guard;
                let _permit = permits.acquire_owned().await.ok();
                task.await;
            }
            .instrument(self.span.clone()),
        );
        Launch::Started
    }

    /// Check whether a task for `reference` is running.
    pub fn is_in_flight(&self, reference: &AttachmentRef) -> bool {
        self.shared.lock().contains(reference)
    }

    /// Number of running tasks.
    pub fn in_flight(&self) -> usize {
        self.shared.lock().len()
    }

    /// Wait until no task is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}
