//! Counting barrier for dispatched jobs
//!
//! Every job admitted to the queue takes a [`CompletionGuard`]. The guard
//! signals completion exactly once: explicitly through
//! [`CompletionGuard::complete`], or implicitly when it is dropped on any
//! other exit path (early return, failed send, panic unwinding). The
//! coordinator awaits [`CompletionTracker::wait`] once every job has been
//! admitted.

use crate::state::JobState;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    outstanding: AtomicUsize,
    admitted: AtomicUsize,
    done: AtomicUsize,
    dropped: AtomicUsize,
    drained: Notify,
}

/// Tracks outstanding jobs and wakes the coordinator when all are finished
#[derive(Debug, Clone, Default)]
pub struct CompletionTracker {
    inner: Arc<Inner>,
}

impl CompletionTracker {
    /// Creates a tracker with nothing outstanding
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits one job, returning the guard that will signal its completion
    pub fn admit(&self) -> CompletionGuard {
        self.inner.admitted.fetch_add(1, Ordering::SeqCst);
        self.inner.outstanding.fetch_add(1, Ordering::SeqCst);
        CompletionGuard {
            inner: Some(Arc::clone(&self.inner)),
        }
    }

    /// Waits until every admitted job has signalled completion
    ///
    /// Returns immediately when nothing is outstanding. Must only be called
    /// after the last admission, otherwise it may return while jobs are
    /// still being admitted.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.drained.notified();
            tokio::pin!(notified);
            // Register before checking so a completion between the check and
            // the await is not missed
            notified.as_mut().enable();

            if self.outstanding() == 0 {
                return;
            }

            notified.await;
        }
    }

    /// Jobs admitted but not yet completed
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::SeqCst)
    }

    /// Total jobs admitted
    pub fn admitted(&self) -> usize {
        self.inner.admitted.load(Ordering::SeqCst)
    }

    /// Total completion signals received
    pub fn completed(&self) -> usize {
        self.done() + self.dropped()
    }

    /// Jobs that completed as [`JobState::Done`]
    pub fn done(&self) -> usize {
        self.inner.done.load(Ordering::SeqCst)
    }

    /// Jobs that completed as [`JobState::Dropped`]
    pub fn dropped(&self) -> usize {
        self.inner.dropped.load(Ordering::SeqCst)
    }
}

/// Proof of admission for one job
///
/// Dropping the guard without calling [`complete`](Self::complete) records
/// the job as dropped.
#[derive(Debug)]
pub struct CompletionGuard {
    inner: Option<Arc<Inner>>,
}

impl CompletionGuard {
    /// Signals completion with a terminal outcome
    ///
    /// Anything other than [`JobState::Done`] is counted as dropped.
    pub fn complete(mut self, outcome: JobState) {
        self.signal(outcome);
    }

    fn signal(&mut self, outcome: JobState) {
        let Some(inner) = self.inner.take() else {
            return;
        };

        if outcome.is_success() {
            inner.done.fetch_add(1, Ordering::SeqCst);
        } else {
            inner.dropped.fetch_add(1, Ordering::SeqCst);
        }

        if inner.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            inner.drained.notify_waiters();
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.signal(JobState::Dropped);
    }
}
