//! Extendable event results.
//!
//! A handler may answer before its side effects finish (e.g. the cache write
//! after a network response). The unfinished work travels with the answer so
//! the host can keep the worker alive until it settles.

use tokio::task::JoinHandle;

/// A handler result plus the background tasks still running on its behalf.
#[derive(Debug)]
pub struct Extended<T> {
    value: T,
    pending: Vec<JoinHandle<()>>,
}

impl<T> Extended<T> {
    pub fn new(value: T) -> Self {
        Self { value, pending: Vec::new() }
    }

    /// Attach a task the host must wait for before the event is finished.
    pub fn wait_until(mut self, task: JoinHandle<()>) -> Self {
        self.pending.push(task);
        self
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// Number of attached tasks.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Wait for every attached task, then return the value.
    ///
    /// Tasks log their own failures; a panicked task is logged here.
    pub async fn settle(self) -> T {
        for task in self.pending {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "background task of event did not complete");
            }
        }
        self.value
    }

    /// Return the value and leave attached tasks running unobserved.
    pub fn detach(self) -> T {
        self.value
    }
}
