//! High-priority one-shot tasks posted back onto the control loop.
//!
//! This is the only path by which threads other than the control loop reach
//! engine state: they push a [`Task`] and return.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::debug;

use crate::binding::WindowId;
use crate::event::Generation;

/// Work deferred onto the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// The junction feed toward a preview branch is blocked; detach it
    BlockConfirmed { window: WindowId, generation: Generation },
    /// A window fault made a surface unusable; start its removal
    RemoveDefunct { window: WindowId },
    /// Finish sweeping bindings after the pipeline was torn down
    CompleteTeardown { generation: Generation },
}

/// Cloneable, `Send` handle for scheduling tasks.
#[derive(Debug, Clone)]
pub struct Scheduler {
    tx: mpsc::UnboundedSender<Task>,
    scheduled: Arc<AtomicU64>,
}

/// Receiving half, drained ahead of every other input by the control loop.
#[derive(Debug)]
pub struct TaskQueue {
    rx: mpsc::UnboundedReceiver<Task>,
}

impl Scheduler {
    /// Create a scheduler and the queue it feeds.
    #[must_use]
    pub fn channel() -> (Self, TaskQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, scheduled: Arc::new(AtomicU64::new(0)) }, TaskQueue { rx })
    }

    /// Post a task. Returns false if the control loop is gone.
    pub fn schedule(&self, task: Task) -> bool {
        self.scheduled.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(task).is_err() {
            debug!(?task, "Control loop gone, dropping task");
            return false;
        }
        true
    }

    /// Total tasks ever posted through any clone of this scheduler.
    #[must_use]
    pub fn scheduled(&self) -> u64 {
        self.scheduled.load(Ordering::Relaxed)
    }
}

impl TaskQueue {
    /// Wait for the next task.
    pub async fn recv(&mut self) -> Option<Task> {
        self.rx.recv().await
    }

    /// Take a task if one is ready.
    pub fn try_recv(&mut self) -> Option<Task> {
        self.rx.try_recv().ok()
    }
}
